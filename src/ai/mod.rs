//! AI-assisted extraction of transactions from receipt images and statements.
//!
//! A [`ReceiptAnalyzer`] turns an uploaded file into either one receipt
//! suggestion or an ordered list of statement entries. Each call is a single
//! request/response exchange with no retry.

mod demo;
mod gemini;
mod response;

pub use demo::DemoAnalyzer;
pub use gemini::GeminiClient;
pub use response::{parse_receipt, parse_statement, strip_code_fences};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::{is_valid_category, NewTransaction, TransactionType, Upload, FALLBACK_CATEGORY};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AiError {
    /// Raised before any network call is attempted.
    #[error("AI API key is missing; set the configured API key environment variable")]
    MissingApiKey,
    #[error("AI service unreachable: {0}")]
    Service(String),
    #[error("AI response could not be understood: {0}")]
    Parse(String),
}

/// Fields suggested by a single receipt scan. Every field is optional; the
/// form decides which ones to apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiptScan {
    pub title: Option<String>,
    pub amount: Option<Decimal>,
    pub date: Option<NaiveDate>,
    pub category_guess: Option<String>,
}

impl ReceiptScan {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.amount.is_none()
            && self.date.is_none()
            && self.category_guess.is_none()
    }
}

/// One line extracted from a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementEntry {
    pub date: Option<NaiveDate>,
    pub title: String,
    /// Magnitude; direction is in `kind`.
    pub amount: Decimal,
    pub kind: TransactionType,
    pub category: Option<String>,
}

pub const UNTITLED_ENTRY: &str = "Başlıksız işlem";

impl StatementEntry {
    /// Draft transaction for review. Statement imports never carry a receipt.
    pub fn into_new_transaction(self, today: NaiveDate) -> NewTransaction {
        let title = if self.title.trim().is_empty() {
            UNTITLED_ENTRY.to_string()
        } else {
            self.title.trim().to_string()
        };
        let category = self
            .category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| is_valid_category(c))
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());
        NewTransaction::new(
            title,
            self.amount.abs(),
            self.kind,
            category,
            self.date.unwrap_or(today),
        )
    }
}

/// Extraction backend.
#[async_trait]
pub trait ReceiptAnalyzer: Send + Sync {
    async fn analyze_receipt(&self, upload: &Upload) -> Result<ReceiptScan, AiError>;

    async fn analyze_statement(&self, upload: &Upload) -> Result<Vec<StatementEntry>, AiError>;

    fn name(&self) -> &str;
}
