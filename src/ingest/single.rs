use chrono::NaiveDate;
use tracing::{info, warn};

use crate::ai::ReceiptScan;
use crate::compress::compress_receipt;
use crate::models::{
    is_valid_category, NewTransaction, Transaction, TransactionType, Upload, DEFAULT_CATEGORY,
    MAX_AMOUNT,
};
use crate::notice::Notice;

use super::reconcile::{AmountText, FormField};
use super::{FlowContext, FlowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleState {
    Idle,
    Scanning,
    Editing,
    Submitting,
    Closed,
}

impl SingleState {
    fn describe(self) -> &'static str {
        match self {
            SingleState::Idle => "idle",
            SingleState::Scanning => "scanning a receipt",
            SingleState::Editing => "editing",
            SingleState::Submitting => "saving",
            SingleState::Closed => "closed",
        }
    }
}

/// Draft fields of the single-entry form.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionForm {
    pub title: FormField<String>,
    pub amount: FormField<AmountText>,
    pub kind: TransactionType,
    pub category: FormField<String>,
    /// Free-text category instead of the suggested list. AI category guesses
    /// are not applied in this mode.
    pub custom_category: bool,
    pub date: FormField<NaiveDate>,
}

impl TransactionForm {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            title: FormField::new(String::new()),
            amount: FormField::new(AmountText::default()),
            kind: TransactionType::Expense,
            category: FormField::new(DEFAULT_CATEGORY.to_string()),
            custom_category: false,
            date: FormField::new(today),
        }
    }

    /// Merge a scan result; only fields the scan filled in are considered.
    pub fn apply_scan(&mut self, scan: &ReceiptScan) {
        if let Some(title) = &scan.title {
            self.title.apply_suggestion(title.clone());
        }
        if let Some(amount) = scan.amount {
            self.amount.apply_suggestion(AmountText::from_decimal(amount));
        }
        if let Some(date) = scan.date {
            self.date.apply_suggestion(date);
        }
        if let Some(category) = &scan.category_guess {
            if !self.custom_category {
                self.category.apply_suggestion(category.clone());
            }
        }
    }

    /// Build the transaction to store, or say what is missing.
    pub fn to_new_transaction(&self) -> Result<NewTransaction, FlowError> {
        let title = self.title.value().trim();
        if title.is_empty() {
            return Err(FlowError::Validation("Title is required".to_string()));
        }
        let amount = self
            .amount
            .value()
            .parse()
            .ok_or_else(|| FlowError::Validation("Amount must be a number".to_string()))?;
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(FlowError::Validation(
                "Amount must not be negative".to_string(),
            ));
        }
        if amount > MAX_AMOUNT {
            return Err(FlowError::Validation("Amount is too large".to_string()));
        }
        let category = self.category.value().trim();
        if category.is_empty() {
            return Err(FlowError::Validation("Category is required".to_string()));
        }
        if !is_valid_category(category) {
            return Err(FlowError::Validation(
                "Category must not contain commas, quotes or line breaks".to_string(),
            ));
        }
        Ok(NewTransaction::new(
            title,
            amount,
            self.kind,
            category,
            *self.date.value(),
        ))
    }
}

/// One manually entered (optionally receipt-scanned) transaction.
pub struct SingleEntryFlow {
    ctx: FlowContext,
    state: SingleState,
    form: TransactionForm,
    receipt: Option<Upload>,
    /// URL of `receipt` once uploaded, so a retry after a failed write does
    /// not upload it again.
    receipt_url: Option<String>,
    notice: Option<Notice>,
}

impl SingleEntryFlow {
    pub fn new(ctx: FlowContext) -> Self {
        let today = ctx.clock.today();
        Self {
            ctx,
            state: SingleState::Idle,
            form: TransactionForm::new(today),
            receipt: None,
            receipt_url: None,
            notice: None,
        }
    }

    pub fn state(&self) -> SingleState {
        self.state
    }

    pub fn form(&self) -> &TransactionForm {
        &self.form
    }

    pub fn receipt(&self) -> Option<&Upload> {
        self.receipt.as_ref()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    fn ensure_open(&self) -> Result<(), FlowError> {
        match self.state {
            SingleState::Idle | SingleState::Editing => Ok(()),
            other => Err(FlowError::InvalidState(other.describe())),
        }
    }

    fn touch(&mut self) -> Result<&mut TransactionForm, FlowError> {
        self.ensure_open()?;
        self.state = SingleState::Editing;
        Ok(&mut self.form)
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> Result<(), FlowError> {
        self.touch()?.title.edit(title.into());
        Ok(())
    }

    pub fn set_amount(&mut self, amount: impl Into<String>) -> Result<(), FlowError> {
        self.touch()?.amount.edit(AmountText::new(amount));
        Ok(())
    }

    pub fn set_kind(&mut self, kind: TransactionType) -> Result<(), FlowError> {
        self.touch()?.kind = kind;
        Ok(())
    }

    pub fn set_category(&mut self, category: impl Into<String>) -> Result<(), FlowError> {
        self.touch()?.category.edit(category.into());
        Ok(())
    }

    /// Switch between the suggested list and a free-text category.
    pub fn set_custom_category(&mut self, custom: bool) -> Result<(), FlowError> {
        let form = self.touch()?;
        form.custom_category = custom;
        if custom {
            form.category.edit(String::new());
        } else {
            form.category = FormField::new(DEFAULT_CATEGORY.to_string());
        }
        Ok(())
    }

    pub fn set_date(&mut self, date: NaiveDate) -> Result<(), FlowError> {
        self.touch()?.date.edit(date);
        Ok(())
    }

    /// Attach a receipt without scanning it.
    pub fn attach_receipt(&mut self, upload: Upload) -> Result<(), FlowError> {
        self.ensure_open()?;
        self.receipt = Some(upload);
        self.receipt_url = None;
        Ok(())
    }

    pub fn remove_receipt(&mut self) -> Result<(), FlowError> {
        self.ensure_open()?;
        self.receipt = None;
        self.receipt_url = None;
        Ok(())
    }

    /// Scan a receipt and merge the result into the form. Only a successful
    /// scan makes the file the pending receipt.
    pub async fn scan(&mut self, upload: Upload) -> Result<ReceiptScan, FlowError> {
        self.ensure_open()?;
        let resume = self.state;
        self.state = SingleState::Scanning;
        match self.ctx.analyzer.analyze_receipt(&upload).await {
            Ok(scan) => {
                self.receipt = Some(upload);
                self.receipt_url = None;
                self.form.apply_scan(&scan);
                self.state = SingleState::Editing;
                self.notice = Some(if scan.is_empty() {
                    Notice::info("No details could be read from the receipt")
                } else {
                    Notice::info("Receipt scanned")
                });
                info!(analyzer = self.ctx.analyzer.name(), "Receipt scan applied");
                Ok(scan)
            }
            Err(err) => {
                warn!(error = %err, "Receipt scan failed");
                self.state = resume;
                self.notice = Some(Notice::error(err.to_string()));
                Err(err.into())
            }
        }
    }

    fn fail(&mut self, err: FlowError) -> FlowError {
        self.state = SingleState::Editing;
        self.notice = Some(Notice::error(err.to_string()));
        err
    }

    /// Validate, upload the receipt if any, and store the transaction.
    pub async fn submit(&mut self) -> Result<Transaction, FlowError> {
        self.ensure_open()?;
        let mut new = match self.form.to_new_transaction() {
            Ok(new) => new,
            Err(err) => return Err(self.fail(err)),
        };
        self.state = SingleState::Submitting;

        if self.receipt_url.is_none() {
            if let Some(receipt) = self.receipt.clone() {
                let prepared = match self.ctx.compression {
                    Some(settings) if receipt.is_image() => {
                        match compress_receipt(&receipt, &settings) {
                            Ok(compressed) => compressed,
                            Err(err) => return Err(self.fail(err.into())),
                        }
                    }
                    _ => receipt,
                };
                match self.ctx.uploader.upload(&self.ctx.user, &prepared).await {
                    Ok(url) => self.receipt_url = Some(url),
                    Err(err) => {
                        warn!(error = %err, "Receipt upload failed");
                        return Err(self.fail(err.into()));
                    }
                }
            }
        }
        if let Some(url) = &self.receipt_url {
            new = new.with_receipt_url(url.clone());
        }

        match self.ctx.store.add(&self.ctx.user, new).await {
            Ok(txn) => {
                self.state = SingleState::Closed;
                self.notice = Some(Notice::info("Transaction saved"));
                Ok(txn)
            }
            Err(err) => {
                warn!(error = %err, "Saving transaction failed");
                Err(self.fail(err.into()))
            }
        }
    }

    pub fn close(&mut self) {
        self.state = SingleState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use crate::ai::{AiError, ReceiptAnalyzer, StatementEntry};
    use crate::clock::FixedClock;
    use crate::compress::CompressionSettings;
    use crate::models::User;
    use crate::storage::{MemoryStore, MemoryUploader, StoreError, TransactionStore, UploadError};

    struct Scripted(Result<ReceiptScan, AiError>);

    #[async_trait]
    impl ReceiptAnalyzer for Scripted {
        async fn analyze_receipt(&self, _upload: &Upload) -> Result<ReceiptScan, AiError> {
            self.0.clone()
        }

        async fn analyze_statement(&self, _upload: &Upload) -> Result<Vec<StatementEntry>, AiError> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        uploader: Arc<MemoryUploader>,
        flow: SingleEntryFlow,
    }

    fn fixture(scan: Result<ReceiptScan, AiError>) -> Fixture {
        let clock = Arc::new(FixedClock::on_date(2026, 10, 18));
        let store = Arc::new(MemoryStore::with_generators(
            Arc::new(crate::models::DemoIdGenerator),
            clock.clone(),
        ));
        let uploader = Arc::new(MemoryUploader::new(clock.clone()));
        let ctx = FlowContext {
            user: User::demo(),
            analyzer: Arc::new(Scripted(scan)),
            uploader: uploader.clone(),
            store: store.clone(),
            clock,
            compression: None,
        };
        Fixture {
            store,
            uploader,
            flow: SingleEntryFlow::new(ctx),
        }
    }

    fn starbucks() -> ReceiptScan {
        ReceiptScan {
            title: Some("Starbucks".to_string()),
            amount: Some(Decimal::new(1250, 2)),
            date: NaiveDate::from_ymd_opt(2026, 10, 17),
            category_guess: Some("food".to_string()),
        }
    }

    fn receipt() -> Upload {
        Upload::new("fis.pdf", "application/pdf", b"%PDF".to_vec())
    }

    #[tokio::test]
    async fn scan_fills_empty_fields_and_keeps_user_edits() {
        let mut f = fixture(Ok(starbucks()));
        f.flow.set_title("Sabah kahvesi").unwrap();

        f.flow.scan(receipt()).await.unwrap();

        let form = f.flow.form();
        assert_eq!(f.flow.state(), SingleState::Editing);
        assert_eq!(form.title.value(), "Sabah kahvesi");
        assert_eq!(form.amount.value().as_str(), "12.5");
        assert_eq!(*form.date.value(), NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
    }

    #[tokio::test]
    async fn custom_category_ignores_guess() {
        let mut f = fixture(Ok(starbucks()));
        f.flow.set_custom_category(true).unwrap();
        f.flow.set_category("kafe").unwrap();
        f.flow.scan(receipt()).await.unwrap();
        assert_eq!(f.flow.form().category.value(), "kafe");
    }

    #[tokio::test]
    async fn failed_scan_changes_nothing() {
        let mut f = fixture(Err(AiError::MissingApiKey));
        let before = f.flow.form().clone();

        let err = f.flow.scan(receipt()).await.unwrap_err();

        assert_eq!(err, FlowError::Ai(AiError::MissingApiKey));
        assert_eq!(f.flow.state(), SingleState::Idle);
        assert_eq!(f.flow.form(), &before);
        assert!(f.flow.notice().unwrap().is_error());
        assert!(f.flow.receipt().is_none());
    }

    #[tokio::test]
    async fn failed_scan_keeps_the_attached_receipt() {
        let mut f = fixture(Err(AiError::Service("unavailable".to_string())));
        f.flow.attach_receipt(receipt()).unwrap();

        let blurry = Upload::new("bulanik.jpg", "image/jpeg", vec![0xff, 0xd8]);
        assert!(f.flow.scan(blurry).await.is_err());
        assert_eq!(f.flow.receipt().map(|r| r.file_name.as_str()), Some("fis.pdf"));

        f.flow.set_title("Simit").unwrap();
        f.flow.set_amount("15").unwrap();
        let txn = f.flow.submit().await.unwrap();
        assert!(txn.receipt_url.unwrap().ends_with("fis.pdf"));
    }

    #[tokio::test]
    async fn validation_failure_keeps_fields() {
        let mut f = fixture(Ok(ReceiptScan::default()));
        f.flow.set_amount("12,5").unwrap();

        let err = f.flow.submit().await.unwrap_err();
        assert_eq!(err, FlowError::Validation("Title is required".to_string()));
        assert_eq!(f.flow.state(), SingleState::Editing);
        assert_eq!(f.flow.form().amount.value().as_str(), "12,5");

        f.flow.set_title("Simit").unwrap();
        f.flow.set_amount("-3").unwrap();
        assert!(matches!(f.flow.submit().await, Err(FlowError::Validation(_))));
    }

    #[tokio::test]
    async fn oversized_amount_and_delimited_category_are_rejected() {
        let mut f = fixture(Ok(ReceiptScan::default()));
        f.flow.set_title("Ev").unwrap();
        f.flow.set_amount("79228162514264337593543950335").unwrap();
        assert_eq!(
            f.flow.submit().await.unwrap_err(),
            FlowError::Validation("Amount is too large".to_string())
        );

        f.flow.set_amount("250").unwrap();
        f.flow.set_custom_category(true).unwrap();
        f.flow.set_category("kafe, bar").unwrap();
        assert!(matches!(f.flow.submit().await, Err(FlowError::Validation(_))));
        assert_eq!(f.flow.form().category.value(), "kafe, bar");
        assert!(f.store.transactions(&User::demo()).await.is_empty());
    }

    #[tokio::test]
    async fn failed_upload_leaves_fields_for_resubmit() {
        let mut f = fixture(Ok(starbucks()));
        f.flow.scan(receipt()).await.unwrap();
        f.uploader
            .fail_next(UploadError::Transport("offline".to_string()))
            .await;

        let err = f.flow.submit().await.unwrap_err();
        assert!(matches!(err, FlowError::Upload(_)));
        assert_eq!(f.flow.state(), SingleState::Editing);
        assert_eq!(f.flow.form().title.value(), "Starbucks");

        let txn = f.flow.submit().await.unwrap();
        assert_eq!(f.flow.state(), SingleState::Closed);
        assert_eq!(txn.amount, Decimal::new(1250, 2));
        assert!(txn.receipt_url.unwrap().starts_with("memory://receipts/demo-user/"));
        assert_eq!(f.store.transactions(&User::demo()).await.len(), 1);
    }

    #[tokio::test]
    async fn write_failure_does_not_upload_twice() {
        struct Refusing;

        #[async_trait]
        impl TransactionStore for Refusing {
            async fn subscribe(
                &self,
                _user: &User,
            ) -> Result<crate::storage::Subscription, StoreError> {
                Err(StoreError::PermissionDenied)
            }
            async fn add(&self, _user: &User, _new: NewTransaction) -> Result<Transaction, StoreError> {
                Err(StoreError::PermissionDenied)
            }
            async fn delete(&self, _user: &User, _id: &crate::models::Id) -> Result<(), StoreError> {
                Err(StoreError::PermissionDenied)
            }
            async fn add_batch(
                &self,
                _user: &User,
                _batch: Vec<NewTransaction>,
            ) -> Result<Vec<Transaction>, StoreError> {
                Err(StoreError::PermissionDenied)
            }
            fn name(&self) -> &str {
                "refusing"
            }
        }

        let mut f = fixture(Ok(starbucks()));
        f.flow.ctx.store = Arc::new(Refusing);
        f.flow.scan(receipt()).await.unwrap();

        for _ in 0..2 {
            let err = f.flow.submit().await.unwrap_err();
            assert_eq!(err, FlowError::Store(StoreError::PermissionDenied));
            assert_eq!(f.flow.state(), SingleState::Editing);
        }
        assert_eq!(f.uploader.stored_count().await, 1);
    }

    #[tokio::test]
    async fn images_are_compressed_before_upload() {
        let mut f = fixture(Ok(ReceiptScan::default()));
        f.flow.ctx.compression = Some(CompressionSettings {
            max_width: 16,
            jpeg_quality: 60,
        });
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(64, 32));
        let mut png = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        f.flow
            .attach_receipt(Upload::new("fis.png", "image/png", png))
            .unwrap();
        f.flow.set_title("Market").unwrap();
        f.flow.set_amount("10").unwrap();

        let txn = f.flow.submit().await.unwrap();
        let url = txn.receipt_url.unwrap();
        assert!(url.ends_with("_fis.jpg"));
        let stored = f.uploader.get(&url).await.unwrap();
        assert_eq!(image::load_from_memory(&stored.bytes).unwrap().width(), 16);
    }

    #[tokio::test]
    async fn closed_flow_rejects_edits() {
        let mut f = fixture(Ok(starbucks()));
        f.flow.close();
        assert_eq!(
            f.flow.set_title("x"),
            Err(FlowError::InvalidState("closed"))
        );
    }
}
