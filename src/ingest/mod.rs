//! Transaction ingestion: the single-entry form and the statement import
//! review.
//!
//! Both flows are explicit state machines. Every external step (AI call,
//! compression, upload, write) is isolated: a failure puts the flow back in
//! the state it came from with everything the user entered intact.

pub mod reconcile;
mod single;
mod statement;

pub use reconcile::{AmountText, EmptyEquivalent, FieldSource, FormField};
pub use single::{SingleEntryFlow, SingleState, TransactionForm};
pub use statement::{StatementImportFlow, StatementState};

use std::sync::Arc;

use crate::ai::{AiError, ReceiptAnalyzer};
use crate::clock::Clock;
use crate::compress::{CompressError, CompressionSettings};
use crate::models::User;
use crate::storage::{ReceiptUploader, StoreError, TransactionStore, UploadError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("{0}")]
    Validation(String),
    #[error("Not possible while {0}")]
    InvalidState(&'static str),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Image(String),
}

impl From<CompressError> for FlowError {
    fn from(err: CompressError) -> Self {
        FlowError::Image(err.to_string())
    }
}

/// Collaborators shared by both flows for one signed-in user.
#[derive(Clone)]
pub struct FlowContext {
    pub user: User,
    pub analyzer: Arc<dyn ReceiptAnalyzer>,
    pub uploader: Arc<dyn ReceiptUploader>,
    pub store: Arc<dyn TransactionStore>,
    pub clock: Arc<dyn Clock>,
    /// `None` uploads receipts as selected.
    pub compression: Option<CompressionSettings>,
}
