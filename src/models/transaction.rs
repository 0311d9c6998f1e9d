use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

use super::{Id, IdGenerator};

/// Direction of a transaction. Amounts are always stored as magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    #[default]
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransactionType::Income => "Gelir",
            TransactionType::Expense => "Gider",
        }
    }

    /// Lenient parse for values coming from forms and AI output.
    pub fn parse_lenient(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "income" | "gelir" | "credit" | "in" => Some(TransactionType::Income),
            "expense" | "gider" | "debit" | "out" => Some(TransactionType::Expense),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = InvalidTransaction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s).ok_or_else(|| InvalidTransaction::UnknownType(s.to_string()))
    }
}

pub const DEFAULT_CATEGORY: &str = "food";
pub const FALLBACK_CATEGORY: &str = "other";

/// Suggested categories and their display labels. Any other non-blank value
/// is accepted as a custom category.
pub const SUGGESTED_CATEGORIES: &[(&str, &str)] = &[
    ("food", "Yeme & İçme"),
    ("transport", "Ulaşım"),
    ("shopping", "Alışveriş"),
    ("bills", "Faturalar"),
    ("salary", "Maaş"),
    ("other", "Diğer"),
];

pub fn category_label(category: &str) -> &str {
    SUGGESTED_CATEGORIES
        .iter()
        .find(|(key, _)| *key == category)
        .map(|(_, label)| *label)
        .unwrap_or(category)
}

/// Largest amount a single transaction may carry. Keeps sums over a
/// ledger well inside `Decimal` range.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

/// Category keys are exported unquoted, so they may not contain CSV
/// delimiters or line breaks.
pub fn is_valid_category(category: &str) -> bool {
    !category.trim().is_empty() && !category.contains([',', '"', '\n', '\r'])
}

pub fn is_suggested_category(category: &str) -> bool {
    SUGGESTED_CATEGORIES.iter().any(|(key, _)| *key == category)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTransaction {
    #[error("Title is required")]
    MissingTitle,
    #[error("Category is required")]
    MissingCategory,
    #[error("Amount must not be negative: {0}")]
    NegativeAmount(Decimal),
    #[error("Amount is too large: {0}")]
    AmountTooLarge(Decimal),
    #[error("Category must not contain commas, quotes or line breaks")]
    InvalidCategory,
    #[error("Unknown transaction type: {0}")]
    UnknownType(String),
}

/// Parse an occurrence date. Full ISO timestamps are truncated to their date
/// part; day-first dates (`31.01.2026`, `31/01/2026`) are accepted as found on
/// Turkish statements.
pub fn parse_occurrence_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Some(prefix) = value.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }
    ["%d.%m.%Y", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// Anything carrying a direction and a magnitude; lets aggregation run over
/// persisted transactions and unpersisted drafts alike.
pub trait MoneyFlow {
    fn kind(&self) -> TransactionType;
    fn amount(&self) -> Decimal;

    fn signed_amount(&self) -> Decimal {
        match self.kind() {
            TransactionType::Income => self.amount(),
            TransactionType::Expense => -self.amount(),
        }
    }
}

/// A persisted transaction.
///
/// Ownership is expressed by the collection the record lives in, never by a
/// field on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Id,
    pub title: String,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    /// Occurrence date, distinct from `created_at`.
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub receipt_url: Option<String>,
}

impl Transaction {
    pub fn from_new(new: NewTransaction, id: Id, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: new.title,
            amount: new.amount,
            kind: new.kind,
            category: new.category,
            date: new.date,
            created_at,
            receipt_url: new.receipt_url,
        }
    }

    pub fn new_with_generator(
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
        new: NewTransaction,
    ) -> Self {
        Self::from_new(new, ids.new_id(), clock.now())
    }

    pub fn is_income(&self) -> bool {
        self.kind == TransactionType::Income
    }
}

impl MoneyFlow for Transaction {
    fn kind(&self) -> TransactionType {
        self.kind
    }

    fn amount(&self) -> Decimal {
        self.amount
    }
}

/// Newest first: by occurrence date descending, ties broken by creation time
/// descending so freshly added records lead their day.
pub fn newest_first(a: &Transaction, b: &Transaction) -> Ordering {
    b.date
        .cmp(&a.date)
        .then_with(|| b.created_at.cmp(&a.created_at))
}

pub fn sort_newest_first(txns: &mut [Transaction]) {
    txns.sort_by(newest_first);
}

/// Transaction content before the store assigns an id and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub title: String,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub receipt_url: Option<String>,
}

impl NewTransaction {
    pub fn new(
        title: impl Into<String>,
        amount: Decimal,
        kind: TransactionType,
        category: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            title: title.into(),
            amount,
            kind,
            category: category.into(),
            date,
            receipt_url: None,
        }
    }

    pub fn with_receipt_url(mut self, url: impl Into<String>) -> Self {
        self.receipt_url = Some(url.into());
        self
    }

    pub fn validate(&self) -> Result<(), InvalidTransaction> {
        if self.title.trim().is_empty() {
            return Err(InvalidTransaction::MissingTitle);
        }
        if self.category.trim().is_empty() {
            return Err(InvalidTransaction::MissingCategory);
        }
        if !is_valid_category(&self.category) {
            return Err(InvalidTransaction::InvalidCategory);
        }
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err(InvalidTransaction::NegativeAmount(self.amount));
        }
        if self.amount > MAX_AMOUNT {
            return Err(InvalidTransaction::AmountTooLarge(self.amount));
        }
        Ok(())
    }
}

impl MoneyFlow for NewTransaction {
    fn kind(&self) -> TransactionType {
        self.kind
    }

    fn amount(&self) -> Decimal {
        self.amount
    }
}
