//! Transaction data access.
//!
//! A [`TransactionStore`] offers a live, newest-first view of one user's
//! transactions plus create, delete and atomic batch create. The demo
//! [`MemoryStore`] and the remote [`FirestoreStore`] satisfy the same
//! contract.

pub mod firestore;
mod memory;
mod uploads;

pub use firestore::{FirestoreStore, Profile};
pub use memory::MemoryStore;
pub use uploads::{FirebaseStorageUploader, MemoryUploader, ReceiptUploader, UploadError};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::{Id, InvalidTransaction, NewTransaction, Transaction, User};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Permission denied: you do not have access to this data")]
    PermissionDenied,
    #[error("Not signed in or session expired")]
    Unauthenticated,
    #[error("Transaction not found")]
    NotFound,
    #[error("Invalid transaction: {0}")]
    Invalid(String),
    #[error("Data service error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },
    #[error("Data service unreachable: {0}")]
    Transport(String),
    #[error("Unexpected data from service: {0}")]
    Decode(String),
    #[error("Subscription closed")]
    SubscriptionClosed,
}

impl From<InvalidTransaction> for StoreError {
    fn from(err: InvalidTransaction) -> Self {
        StoreError::Invalid(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Transport(err.to_string())
    }
}

/// One state of a live view.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// Nothing received yet.
    Loading,
    Ready(Arc<Vec<Transaction>>),
    Failed(StoreError),
}

impl Snapshot {
    pub fn ready(mut transactions: Vec<Transaction>) -> Self {
        crate::models::sort_newest_first(&mut transactions);
        Snapshot::Ready(Arc::new(transactions))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Snapshot::Loading)
    }
}

/// A live view over one user's transactions.
///
/// Holding the value keeps the listener alive; dropping it releases the
/// listener (and aborts the refresh task for remote stores).
pub struct Subscription {
    rx: watch::Receiver<Snapshot>,
    primed: bool,
    task: Option<JoinHandle<()>>,
    label: String,
}

impl Subscription {
    pub(crate) fn new(rx: watch::Receiver<Snapshot>, label: impl Into<String>) -> Self {
        Self {
            rx,
            primed: false,
            task: None,
            label: label.into(),
        }
    }

    pub(crate) fn with_task(
        rx: watch::Receiver<Snapshot>,
        label: impl Into<String>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            primed: false,
            task: Some(task),
            label: label.into(),
        }
    }

    /// Latest snapshot without waiting.
    pub fn current(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// The first call yields the current snapshot immediately; later calls
    /// wait for the next change.
    pub async fn next(&mut self) -> Result<Snapshot, StoreError> {
        if self.primed {
            self.rx
                .changed()
                .await
                .map_err(|_| StoreError::SubscriptionClosed)?;
        }
        self.primed = true;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Non-blocking variant of [`Subscription::next`]: `None` when nothing
    /// changed since the last call.
    pub fn try_next(&mut self) -> Option<Snapshot> {
        let changed = !self.primed || self.rx.has_changed().unwrap_or(false);
        if !changed {
            return None;
        }
        self.primed = true;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the view leaves `Loading`.
    pub async fn wait_ready(&mut self) -> Result<Arc<Vec<Transaction>>, StoreError> {
        loop {
            match self.next().await? {
                Snapshot::Loading => continue,
                Snapshot::Ready(list) => return Ok(list),
                Snapshot::Failed(err) => return Err(err),
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        debug!(subscription = %self.label, "Subscription released");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("primed", &self.primed)
            .finish()
    }
}

/// Per-user transaction persistence.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Open a live view ordered by date descending, then creation time
    /// descending.
    async fn subscribe(&self, user: &User) -> Result<Subscription, StoreError>;

    async fn add(&self, user: &User, new: NewTransaction) -> Result<Transaction, StoreError>;

    async fn delete(&self, user: &User, id: &Id) -> Result<(), StoreError>;

    /// All records are written or none are.
    async fn add_batch(
        &self,
        user: &User,
        batch: Vec<NewTransaction>,
    ) -> Result<Vec<Transaction>, StoreError>;

    fn name(&self) -> &str;
}

/// Reject the whole batch when any entry is invalid, naming its position.
pub(crate) fn validate_batch(batch: &[NewTransaction]) -> Result<(), StoreError> {
    for (index, new) in batch.iter().enumerate() {
        new.validate()
            .map_err(|e| StoreError::Invalid(format!("entry {}: {e}", index + 1)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::models::TransactionType;

    fn txn(id: &str, day: u32) -> Transaction {
        Transaction::from_new(
            NewTransaction::new(
                id,
                Decimal::ONE,
                TransactionType::Expense,
                "food",
                NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
            ),
            Id::from_string(id),
            Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn next_yields_current_then_waits_for_change() {
        let (tx, rx) = watch::channel(Snapshot::ready(vec![txn("a", 1)]));
        let mut sub = Subscription::new(rx, "test");

        assert!(matches!(sub.next().await.unwrap(), Snapshot::Ready(l) if l.len() == 1));
        assert!(sub.try_next().is_none());

        tx.send(Snapshot::ready(vec![txn("a", 1), txn("b", 2)])).unwrap();
        let list = sub.wait_ready().await.unwrap();
        assert_eq!(list[0].id.as_str(), "b");
    }

    #[tokio::test]
    async fn closed_channel_ends_subscription() {
        let (tx, rx) = watch::channel(Snapshot::Loading);
        let mut sub = Subscription::new(rx, "test");
        assert!(sub.next().await.unwrap().is_loading());

        drop(tx);
        assert_eq!(sub.next().await.unwrap_err(), StoreError::SubscriptionClosed);
    }

    #[tokio::test]
    async fn failed_snapshot_surfaces_from_wait_ready() {
        let (_tx, rx) = watch::channel(Snapshot::Failed(StoreError::PermissionDenied));
        let mut sub = Subscription::new(rx, "test");
        assert_eq!(sub.wait_ready().await.unwrap_err(), StoreError::PermissionDenied);
    }

    #[test]
    fn batch_validation_names_the_entry() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let batch = vec![
            NewTransaction::new("ok", Decimal::ONE, TransactionType::Expense, "food", date),
            NewTransaction::new(" ", Decimal::ONE, TransactionType::Expense, "food", date),
        ];
        let err = validate_batch(&batch).unwrap_err();
        assert_eq!(err, StoreError::Invalid("entry 2: Title is required".to_string()));
    }
}
