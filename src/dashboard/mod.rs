//! The signed-in user's dashboard: live list, totals, charts and export.
//!
//! A [`Dashboard`] is bound to one session generation. As soon as the
//! session changes (logout, or another user signs in) it releases its
//! subscription and stops serving the previous user's data.

mod export;
mod render;
mod summary;

pub use export::{export_csv, export_file_name, CSV_HEADER};
pub use render::{render_detail, render_list, render_row, render_summary};
pub use summary::{
    category_breakdown, monthly_summary, totals, CategoryTotal, MonthlySummary, Totals,
    SUMMARY_MONTHS,
};

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::auth::Session;
use crate::models::{Id, Transaction, User};
use crate::storage::{Snapshot, StoreError, Subscription, TransactionStore};

pub const PERMISSION_DENIED_MESSAGE: &str =
    "Veritabanı erişim izni yok. Lütfen Firestore kurallarını kontrol edin.";
pub const SESSION_ENDED_MESSAGE: &str = "Oturum sona erdi. Lütfen tekrar giriş yapın.";

/// User-facing text for a failed live view.
pub fn load_failure_message(err: &StoreError) -> String {
    match err {
        StoreError::PermissionDenied => PERMISSION_DENIED_MESSAGE.to_string(),
        other => format!("Veri yüklenirken bir hata oluştu: {other}"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DashboardState {
    Loading,
    Ready(Arc<Vec<Transaction>>),
    Failed(String),
}

pub struct Dashboard {
    store: Arc<dyn TransactionStore>,
    user: User,
    generation: u64,
    sessions: watch::Receiver<Option<Session>>,
    subscription: Option<Subscription>,
    state: DashboardState,
}

impl Dashboard {
    /// Open the live view for `session`. `sessions` is the auth context's
    /// change feed; the dashboard goes dark once it reports a different
    /// generation.
    pub async fn open(
        store: Arc<dyn TransactionStore>,
        session: &Session,
        sessions: watch::Receiver<Option<Session>>,
    ) -> Result<Self, StoreError> {
        let subscription = store.subscribe(&session.user).await?;
        info!(
            user_id = %session.user.uid,
            store = store.name(),
            "Dashboard opened"
        );
        Ok(Self {
            store,
            user: session.user.clone(),
            generation: session.generation,
            sessions,
            subscription: Some(subscription),
            state: DashboardState::Loading,
        })
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    fn is_current(&self) -> bool {
        self.sessions
            .borrow()
            .as_ref()
            .is_some_and(|s| s.generation == self.generation)
    }

    /// Drop the subscription and any data if the session moved on.
    fn check_session(&mut self) -> bool {
        if self.is_current() {
            return true;
        }
        if self.subscription.take().is_some() {
            info!(user_id = %self.user.uid, "Session changed; dashboard released");
        }
        self.state = DashboardState::Failed(SESSION_ENDED_MESSAGE.to_string());
        false
    }

    fn apply(&mut self, snapshot: Snapshot) {
        self.state = match snapshot {
            Snapshot::Loading => DashboardState::Loading,
            Snapshot::Ready(list) => DashboardState::Ready(list),
            Snapshot::Failed(err) => {
                warn!(user_id = %self.user.uid, error = %err, "Transaction view failed");
                DashboardState::Failed(load_failure_message(&err))
            }
        };
    }

    /// Wait for the next snapshot and apply it.
    pub async fn refresh(&mut self) -> &DashboardState {
        if !self.check_session() {
            return &self.state;
        }
        let next = match self.subscription.as_mut() {
            Some(sub) => sub.next().await,
            None => Err(StoreError::SubscriptionClosed),
        };
        match next {
            Ok(snapshot) => self.apply(snapshot),
            Err(err) => self.state = DashboardState::Failed(load_failure_message(&err)),
        }
        &self.state
    }

    /// Apply a pending snapshot without waiting. Returns whether anything
    /// changed.
    pub fn poll(&mut self) -> bool {
        if !self.check_session() {
            return true;
        }
        match self.subscription.as_mut().and_then(Subscription::try_next) {
            Some(snapshot) => {
                self.apply(snapshot);
                true
            }
            None => false,
        }
    }

    /// Refresh until the view leaves `Loading`.
    pub async fn load(&mut self) -> &DashboardState {
        loop {
            self.refresh().await;
            if self.state != DashboardState::Loading {
                return &self.state;
            }
        }
    }

    /// The list as last received; empty unless the view is ready.
    pub fn transactions(&self) -> &[Transaction] {
        match &self.state {
            DashboardState::Ready(list) => list.as_slice(),
            _ => &[],
        }
    }

    pub fn find(&self, id: &Id) -> Option<&Transaction> {
        self.transactions().iter().find(|t| &t.id == id)
    }

    pub fn totals(&self) -> Totals {
        totals(self.transactions())
    }

    pub fn category_breakdown(&self) -> Vec<CategoryTotal> {
        category_breakdown(self.transactions())
    }

    pub fn monthly_summary(&self, today: NaiveDate) -> Vec<MonthlySummary> {
        monthly_summary(self.transactions(), today)
    }

    pub fn export_csv(&self) -> String {
        export_csv(self.transactions())
    }

    /// Delete `id` after `confirm` approves it. Returns `Ok(false)` when the
    /// user declined. The list itself updates through the live view.
    pub async fn delete(
        &mut self,
        id: &Id,
        confirm: impl FnOnce(&Transaction) -> bool,
    ) -> Result<bool, StoreError> {
        if !self.check_session() {
            return Err(StoreError::Unauthenticated);
        }
        let txn = self.find(id).ok_or(StoreError::NotFound)?;
        if !confirm(txn) {
            return Ok(false);
        }
        self.store.delete(&self.user, id).await?;
        info!(user_id = %self.user.uid, transaction_id = %id, "Transaction deleted");
        Ok(true)
    }
}
