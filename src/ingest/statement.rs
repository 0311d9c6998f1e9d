use tracing::{info, warn};

use crate::models::{NewTransaction, Transaction, Upload};
use crate::notice::Notice;

use super::{FlowContext, FlowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    Idle,
    Uploading,
    Reviewing,
    Committing,
    Closed,
}

impl StatementState {
    fn describe(self) -> &'static str {
        match self {
            StatementState::Idle => "no statement is loaded",
            StatementState::Uploading => "reading the statement",
            StatementState::Reviewing => "reviewing",
            StatementState::Committing => "saving",
            StatementState::Closed => "closed",
        }
    }
}

/// Bulk import of a statement: extract, review, then save everything in one
/// atomic batch or nothing at all.
pub struct StatementImportFlow {
    ctx: FlowContext,
    state: StatementState,
    drafts: Vec<NewTransaction>,
    notice: Option<Notice>,
}

impl StatementImportFlow {
    pub fn new(ctx: FlowContext) -> Self {
        Self {
            ctx,
            state: StatementState::Idle,
            drafts: Vec::new(),
            notice: None,
        }
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    /// Entries awaiting review, in statement order.
    pub fn drafts(&self) -> &[NewTransaction] {
        &self.drafts
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    fn expect_state(&self, expected: StatementState) -> Result<(), FlowError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(FlowError::InvalidState(self.state.describe()))
        }
    }

    /// Extract entries from `statement` and start the review.
    pub async fn upload(&mut self, statement: Upload) -> Result<usize, FlowError> {
        self.expect_state(StatementState::Idle)?;
        self.state = StatementState::Uploading;

        let entries = match self.ctx.analyzer.analyze_statement(&statement).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(file = %statement.file_name, error = %err, "Statement extraction failed");
                self.state = StatementState::Idle;
                self.notice = Some(Notice::error(err.to_string()));
                return Err(err.into());
            }
        };
        if entries.is_empty() {
            self.state = StatementState::Idle;
            let err = FlowError::Validation("No transactions found in the statement".to_string());
            self.notice = Some(Notice::error(err.to_string()));
            return Err(err);
        }

        let today = self.ctx.clock.today();
        self.drafts = entries
            .into_iter()
            .map(|entry| entry.into_new_transaction(today))
            .collect();
        self.state = StatementState::Reviewing;
        self.notice = Some(Notice::info(format!(
            "{} transactions found",
            self.drafts.len()
        )));
        info!(file = %statement.file_name, count = self.drafts.len(), "Statement ready for review");
        Ok(self.drafts.len())
    }

    /// Drop one draft; the others keep their order.
    pub fn remove(&mut self, index: usize) -> Result<NewTransaction, FlowError> {
        self.expect_state(StatementState::Reviewing)?;
        if index >= self.drafts.len() {
            return Err(FlowError::Validation(format!(
                "No entry at position {}",
                index + 1
            )));
        }
        Ok(self.drafts.remove(index))
    }

    /// Abandon the whole batch; nothing is written.
    pub fn discard(&mut self) {
        if !self.drafts.is_empty() {
            info!(count = self.drafts.len(), "Statement import discarded");
        }
        self.drafts.clear();
        self.state = StatementState::Closed;
    }

    /// Save every remaining draft in one atomic write.
    pub async fn commit(&mut self) -> Result<Vec<Transaction>, FlowError> {
        self.expect_state(StatementState::Reviewing)?;
        if self.drafts.is_empty() {
            let err = FlowError::Validation("There are no entries left to save".to_string());
            self.notice = Some(Notice::error(err.to_string()));
            return Err(err);
        }
        self.state = StatementState::Committing;

        match self
            .ctx
            .store
            .add_batch(&self.ctx.user, self.drafts.clone())
            .await
        {
            Ok(created) => {
                self.drafts.clear();
                self.state = StatementState::Closed;
                self.notice = Some(Notice::info(format!(
                    "{} transactions saved",
                    created.len()
                )));
                Ok(created)
            }
            Err(err) => {
                warn!(error = %err, count = self.drafts.len(), "Statement commit failed");
                self.state = StatementState::Reviewing;
                self.notice = Some(Notice::error(err.to_string()));
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::ai::{AiError, ReceiptAnalyzer, ReceiptScan, StatementEntry};
    use crate::clock::FixedClock;
    use crate::models::{TransactionType, User};
    use crate::storage::{MemoryStore, MemoryUploader, StoreError};

    struct Scripted(Result<Vec<StatementEntry>, AiError>);

    #[async_trait]
    impl ReceiptAnalyzer for Scripted {
        async fn analyze_receipt(&self, _upload: &Upload) -> Result<ReceiptScan, AiError> {
            Ok(ReceiptScan::default())
        }

        async fn analyze_statement(&self, _upload: &Upload) -> Result<Vec<StatementEntry>, AiError> {
            self.0.clone()
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn entry(title: &str, cents: i64, kind: TransactionType) -> StatementEntry {
        StatementEntry {
            date: NaiveDate::from_ymd_opt(2026, 9, 30),
            title: title.to_string(),
            amount: Decimal::new(cents, 2),
            kind,
            category: None,
        }
    }

    fn flow(
        result: Result<Vec<StatementEntry>, AiError>,
    ) -> (Arc<MemoryStore>, StatementImportFlow) {
        let clock = Arc::new(FixedClock::on_date(2026, 10, 18));
        let store = Arc::new(MemoryStore::with_generators(
            Arc::new(crate::models::DemoIdGenerator),
            clock.clone(),
        ));
        let ctx = FlowContext {
            user: User::demo(),
            analyzer: Arc::new(Scripted(result)),
            uploader: Arc::new(MemoryUploader::new(clock.clone())),
            store: store.clone(),
            clock,
            compression: None,
        };
        (store, StatementImportFlow::new(ctx))
    }

    fn statement() -> Upload {
        Upload::new("ekstre.pdf", "application/pdf", b"%PDF".to_vec())
    }

    fn three() -> Vec<StatementEntry> {
        vec![
            entry("A101", 31245, TransactionType::Expense),
            entry("Maaş", 4200000, TransactionType::Income),
            entry("Turkcell", 39900, TransactionType::Expense),
        ]
    }

    #[tokio::test]
    async fn review_remove_and_commit() {
        let (store, mut flow) = flow(Ok(three()));
        assert_eq!(flow.upload(statement()).await.unwrap(), 3);
        assert_eq!(flow.state(), StatementState::Reviewing);
        assert!(flow.drafts().iter().all(|d| d.receipt_url.is_none()));
        assert_eq!(flow.drafts()[0].category, "other");

        let removed = flow.remove(1).unwrap();
        assert_eq!(removed.title, "Maaş");
        let titles: Vec<_> = flow.drafts().iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["A101", "Turkcell"]);

        let created = flow.commit().await.unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(flow.state(), StatementState::Closed);
        assert_eq!(store.transactions(&User::demo()).await.len(), 2);
    }

    #[tokio::test]
    async fn failed_commit_returns_to_review_with_batch_intact() {
        let (store, mut flow) = flow(Ok(three()));
        flow.upload(statement()).await.unwrap();
        store
            .fail_next_batch(StoreError::Remote {
                status: 503,
                message: "unavailable".to_string(),
            })
            .await;

        assert!(matches!(flow.commit().await, Err(FlowError::Store(_))));
        assert_eq!(flow.state(), StatementState::Reviewing);
        assert_eq!(flow.drafts().len(), 3);
        assert!(store.transactions(&User::demo()).await.is_empty());

        assert_eq!(flow.commit().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn empty_review_cannot_be_committed() {
        let (_store, mut flow) = flow(Ok(vec![entry("Tek", 100, TransactionType::Expense)]));
        flow.upload(statement()).await.unwrap();
        flow.remove(0).unwrap();

        assert!(matches!(flow.commit().await, Err(FlowError::Validation(_))));
        assert_eq!(flow.state(), StatementState::Reviewing);
    }

    #[tokio::test]
    async fn extraction_failure_returns_to_idle() {
        let (_store, mut flow) = flow(Err(AiError::Parse("not valid JSON".to_string())));
        let err = flow.upload(statement()).await.unwrap_err();
        assert!(matches!(err, FlowError::Ai(AiError::Parse(_))));
        assert_eq!(flow.state(), StatementState::Idle);
        assert!(flow.drafts().is_empty());
    }

    #[tokio::test]
    async fn discard_writes_nothing() {
        let (store, mut flow) = flow(Ok(three()));
        flow.upload(statement()).await.unwrap();
        flow.discard();
        assert_eq!(flow.state(), StatementState::Closed);
        assert!(store.transactions(&User::demo()).await.is_empty());
        assert!(matches!(flow.commit().await, Err(FlowError::InvalidState(_))));
    }

    #[tokio::test]
    async fn remove_out_of_range_is_rejected() {
        let (_store, mut flow) = flow(Ok(three()));
        flow.upload(statement()).await.unwrap();
        assert!(matches!(flow.remove(7), Err(FlowError::Validation(_))));
        assert_eq!(flow.drafts().len(), 3);
    }
}
