//! In-memory transaction store for demo mode and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, Duration};
use rust_decimal::Decimal;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::models::{
    DemoIdGenerator, Id, IdGenerator, NewTransaction, Transaction, TransactionType, User,
    DEMO_USER_ID,
};

use super::{validate_batch, Snapshot, StoreError, Subscription, TransactionStore};

struct Ledger {
    /// Insertion order, newest insert first.
    transactions: Vec<Transaction>,
    tx: watch::Sender<Snapshot>,
}

impl Ledger {
    fn new(transactions: Vec<Transaction>) -> Self {
        let (tx, _rx) = watch::channel(Snapshot::ready(transactions.clone()));
        Self { transactions, tx }
    }

    fn publish(&self) {
        self.tx
            .send_replace(Snapshot::ready(self.transactions.clone()));
    }
}

/// Session-scoped in-memory store. Listeners are notified synchronously
/// after every mutation.
pub struct MemoryStore {
    ledgers: Mutex<HashMap<String, Ledger>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    fail_next_batch: Mutex<Option<StoreError>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_generators(Arc::new(DemoIdGenerator), Arc::new(SystemClock::local()))
    }

    pub fn with_generators(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledgers: Mutex::new(HashMap::new()),
            ids,
            clock,
            fail_next_batch: Mutex::new(None),
        }
    }

    /// Store pre-filled with the demo user's three sample transactions.
    pub fn with_demo_seed(clock: Arc<dyn Clock>) -> Self {
        Self::with_demo_seed_and_ids(Arc::new(DemoIdGenerator), clock)
    }

    pub fn with_demo_seed_and_ids(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        let seed = demo_seed(ids.as_ref(), clock.as_ref());
        let mut ledgers = HashMap::new();
        ledgers.insert(DEMO_USER_ID.to_string(), Ledger::new(seed));
        Self {
            ledgers: Mutex::new(ledgers),
            ids,
            clock,
            fail_next_batch: Mutex::new(None),
        }
    }

    /// Make the next `add_batch` fail with `err` before anything is written.
    pub async fn fail_next_batch(&self, err: StoreError) {
        *self.fail_next_batch.lock().await = Some(err);
    }

    /// Current contents for `user`, newest first.
    pub async fn transactions(&self, user: &User) -> Vec<Transaction> {
        let ledgers = self.ledgers.lock().await;
        match ledgers.get(&user.uid) {
            Some(ledger) => {
                let mut list = ledger.transactions.clone();
                crate::models::sort_newest_first(&mut list);
                list
            }
            None => Vec::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn demo_seed(ids: &dyn IdGenerator, clock: &dyn Clock) -> Vec<Transaction> {
    let now = clock.now();
    let today = clock.today();
    let days_ago = |n: u64| today.checked_sub_days(Days::new(n)).unwrap_or(today);

    let entries = [
        (
            "Grocery Shopping",
            Decimal::new(12050, 2),
            TransactionType::Expense,
            "food",
            0,
        ),
        (
            "Monthly Salary",
            Decimal::new(500000, 2),
            TransactionType::Income,
            "salary",
            1,
        ),
        (
            "Netflix Subscription",
            Decimal::new(1599, 2),
            TransactionType::Expense,
            "bills",
            2,
        ),
    ];

    entries
        .into_iter()
        .map(|(title, amount, kind, category, age)| {
            let new = NewTransaction::new(title, amount, kind, category, days_ago(age));
            Transaction::from_new(new, ids.new_id(), now - Duration::days(age as i64))
        })
        .collect()
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn subscribe(&self, user: &User) -> Result<Subscription, StoreError> {
        let mut ledgers = self.ledgers.lock().await;
        let ledger = ledgers
            .entry(user.uid.clone())
            .or_insert_with(|| Ledger::new(Vec::new()));
        debug!(user_id = %user.uid, count = ledger.transactions.len(), "Memory subscription opened");
        Ok(Subscription::new(
            ledger.tx.subscribe(),
            format!("memory:{}", user.uid),
        ))
    }

    async fn add(&self, user: &User, new: NewTransaction) -> Result<Transaction, StoreError> {
        new.validate()?;
        let txn = Transaction::new_with_generator(self.ids.as_ref(), self.clock.as_ref(), new);

        let mut ledgers = self.ledgers.lock().await;
        let ledger = ledgers
            .entry(user.uid.clone())
            .or_insert_with(|| Ledger::new(Vec::new()));
        ledger.transactions.insert(0, txn.clone());
        ledger.publish();

        info!(user_id = %user.uid, id = %txn.id, "Transaction added");
        Ok(txn)
    }

    async fn delete(&self, user: &User, id: &Id) -> Result<(), StoreError> {
        let mut ledgers = self.ledgers.lock().await;
        let ledger = ledgers.get_mut(&user.uid).ok_or(StoreError::NotFound)?;
        let position = ledger
            .transactions
            .iter()
            .position(|t| &t.id == id)
            .ok_or(StoreError::NotFound)?;
        ledger.transactions.remove(position);
        ledger.publish();

        info!(user_id = %user.uid, id = %id, "Transaction deleted");
        Ok(())
    }

    async fn add_batch(
        &self,
        user: &User,
        batch: Vec<NewTransaction>,
    ) -> Result<Vec<Transaction>, StoreError> {
        validate_batch(&batch)?;
        if let Some(err) = self.fail_next_batch.lock().await.take() {
            warn!(user_id = %user.uid, error = %err, "Batch write rejected");
            return Err(err);
        }

        let created: Vec<Transaction> = batch
            .into_iter()
            .map(|new| Transaction::new_with_generator(self.ids.as_ref(), self.clock.as_ref(), new))
            .collect();

        let mut ledgers = self.ledgers.lock().await;
        let ledger = ledgers
            .entry(user.uid.clone())
            .or_insert_with(|| Ledger::new(Vec::new()));
        ledger.transactions.splice(0..0, created.iter().cloned());
        ledger.publish();

        info!(user_id = %user.uid, count = created.len(), "Transaction batch added");
        Ok(created)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{FixedIdGenerator, MoneyFlow};
    use chrono::NaiveDate;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::on_date(2026, 10, 18))
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn new(title: &str, amount: i64, d: u32) -> NewTransaction {
        NewTransaction::new(title, Decimal::new(amount, 0), TransactionType::Expense, "food", date(d))
    }

    #[tokio::test]
    async fn demo_seed_balance() {
        let store = MemoryStore::with_demo_seed(clock());
        let list = store.transactions(&User::demo()).await;

        assert_eq!(list.len(), 3);
        assert_eq!(list[0].title, "Grocery Shopping");
        assert_eq!(list[0].date, date(18));
        assert_eq!(list[1].date, date(17));
        assert_eq!(list[2].date, date(16));
        let balance: Decimal = list.iter().map(|t| t.signed_amount()).sum();
        assert_eq!(balance, Decimal::new(486351, 2));
    }

    #[tokio::test]
    async fn subscribe_yields_current_list_then_each_change() {
        let ids = Arc::new(FixedIdGenerator::new([Id::from("new-1")]));
        let store = MemoryStore::with_generators(ids, clock());
        let user = User::new("u1");

        let mut sub = store.subscribe(&user).await.unwrap();
        assert!(matches!(sub.try_next(), Some(Snapshot::Ready(l)) if l.is_empty()));
        assert!(sub.try_next().is_none());

        let added = store.add(&user, new("Simit", 15, 18)).await.unwrap();
        assert_eq!(added.id.as_str(), "new-1");
        assert_eq!(added.created_at, clock().now());

        match sub.try_next() {
            Some(Snapshot::Ready(list)) => assert_eq!(list[0].id.as_str(), "new-1"),
            other => panic!("expected ready snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn users_do_not_see_each_other() {
        let store = MemoryStore::with_demo_seed(clock());
        let other = User::new("someone-else");
        let mut sub = store.subscribe(&other).await.unwrap();
        assert!(sub.wait_ready().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_id_is_not_found() {
        let store = MemoryStore::with_demo_seed(clock());
        let err = store
            .delete(&User::demo(), &Id::from("missing"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
        assert_eq!(store.transactions(&User::demo()).await.len(), 3);
    }

    #[tokio::test]
    async fn add_rejects_negative_amount() {
        let store = MemoryStore::new();
        let mut bad = new("İade", 1, 18);
        bad.amount = Decimal::new(-5, 0);
        assert!(matches!(
            store.add(&User::demo(), bad).await,
            Err(StoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn injected_batch_failure_writes_nothing() {
        let store = MemoryStore::with_demo_seed(clock());
        let user = User::demo();
        store
            .fail_next_batch(StoreError::Transport("offline".to_string()))
            .await;

        let batch = vec![new("A", 1, 10), new("B", 2, 11)];
        assert!(store.add_batch(&user, batch.clone()).await.is_err());
        assert_eq!(store.transactions(&user).await.len(), 3);

        let created = store.add_batch(&user, batch).await.unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(store.transactions(&user).await.len(), 5);
    }
}
