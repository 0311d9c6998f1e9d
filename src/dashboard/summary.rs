//! Aggregations over the current transaction list.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::format::month_label;
use crate::models::{MoneyFlow, Transaction, TransactionType, FALLBACK_CATEGORY};

/// Number of calendar months shown in the monthly summary.
pub const SUMMARY_MONTHS: u32 = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub income: Decimal,
    pub expense: Decimal,
    pub balance: Decimal,
}

/// Income, expense and balance (`income - expense`). Order does not matter.
pub fn totals<T: MoneyFlow>(items: &[T]) -> Totals {
    let mut totals = Totals::default();
    for item in items {
        match item.kind() {
            TransactionType::Income => totals.income += item.amount(),
            TransactionType::Expense => totals.expense += item.amount(),
        }
    }
    totals.balance = totals.income - totals.expense;
    totals
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: Decimal,
}

/// Expense totals per category, largest first. Blank categories count as
/// `other`.
pub fn category_breakdown(transactions: &[Transaction]) -> Vec<CategoryTotal> {
    let mut by_category: HashMap<&str, Decimal> = HashMap::new();
    for txn in transactions.iter().filter(|t| t.kind == TransactionType::Expense) {
        let category = match txn.category.trim() {
            "" => FALLBACK_CATEGORY,
            other => other,
        };
        *by_category.entry(category).or_default() += txn.amount;
    }

    let mut out: Vec<CategoryTotal> = by_category
        .into_iter()
        .map(|(category, total)| CategoryTotal {
            category: category.to_string(),
            total,
        })
        .collect();
    out.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.category.cmp(&b.category)));
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub label: &'static str,
    pub income: Decimal,
    pub expense: Decimal,
}

/// The current month and the five before it, oldest first. Months without
/// activity appear with zero totals.
pub fn monthly_summary(transactions: &[Transaction], today: NaiveDate) -> Vec<MonthlySummary> {
    let current = today.year() * 12 + today.month0() as i32;
    let mut months: Vec<MonthlySummary> = (0..SUMMARY_MONTHS as i32)
        .rev()
        .map(|back| {
            let index = current - back;
            let month = (index.rem_euclid(12) + 1) as u32;
            MonthlySummary {
                year: index.div_euclid(12),
                month,
                label: month_label(month),
                income: Decimal::ZERO,
                expense: Decimal::ZERO,
            }
        })
        .collect();

    for txn in transactions {
        let slot = months
            .iter_mut()
            .find(|m| m.year == txn.date.year() && m.month == txn.date.month());
        if let Some(slot) = slot {
            match txn.kind {
                TransactionType::Income => slot.income += txn.amount,
                TransactionType::Expense => slot.expense += txn.amount,
            }
        }
    }
    months
}
