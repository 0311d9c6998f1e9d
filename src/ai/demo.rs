use std::sync::Arc;

use async_trait::async_trait;
use chrono::Days;
use rust_decimal::Decimal;

use crate::clock::{Clock, SystemClock};
use crate::models::{TransactionType, Upload};

use super::{AiError, ReceiptAnalyzer, ReceiptScan, StatementEntry};

/// Canned extraction results for demo mode; never touches the network.
pub struct DemoAnalyzer {
    clock: Arc<dyn Clock>,
}

impl DemoAnalyzer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for DemoAnalyzer {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::local()))
    }
}

#[async_trait]
impl ReceiptAnalyzer for DemoAnalyzer {
    async fn analyze_receipt(&self, _upload: &Upload) -> Result<ReceiptScan, AiError> {
        Ok(ReceiptScan {
            title: Some("Starbucks Coffee".to_string()),
            amount: Some(Decimal::new(1250, 2)),
            date: Some(self.clock.today()),
            category_guess: Some("food".to_string()),
        })
    }

    async fn analyze_statement(&self, _upload: &Upload) -> Result<Vec<StatementEntry>, AiError> {
        let today = self.clock.today();
        let days_ago = |n: u64| today.checked_sub_days(Days::new(n)).unwrap_or(today);
        Ok(vec![
            StatementEntry {
                date: Some(days_ago(1)),
                title: "Migros".to_string(),
                amount: Decimal::new(34875, 2),
                kind: TransactionType::Expense,
                category: Some("food".to_string()),
            },
            StatementEntry {
                date: Some(days_ago(3)),
                title: "İstanbulkart Dolum".to_string(),
                amount: Decimal::new(200, 0),
                kind: TransactionType::Expense,
                category: Some("transport".to_string()),
            },
            StatementEntry {
                date: Some(days_ago(5)),
                title: "Para İadesi".to_string(),
                amount: Decimal::new(7990, 2),
                kind: TransactionType::Income,
                category: Some("shopping".to_string()),
            },
        ])
    }

    fn name(&self) -> &str {
        "demo"
    }
}
