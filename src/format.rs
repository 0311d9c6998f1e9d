//! Display formatting for amounts, dates and style classes.
//!
//! Values are rendered the way a Turkish locale does: `.` groups thousands,
//! `,` separates decimals, and months use their short Turkish names.

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{MoneyFlow, TransactionType};

pub const DEFAULT_CURRENCY_SYMBOL: &str = "₺";

const MONTH_SHORT: [&str; 12] = [
    "Oca", "Şub", "Mar", "Nis", "May", "Haz", "Tem", "Ağu", "Eyl", "Eki", "Kas", "Ara",
];

fn group_int_digits(int_part: &str, separator: char) -> String {
    let mut out = String::with_capacity(int_part.len() + int_part.len() / 3);
    let len = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        out.push(ch);
        let remaining = len.saturating_sub(i + 1);
        if remaining > 0 && remaining % 3 == 0 {
            out.push(separator);
        }
    }
    out
}

/// Split a non-negative decimal into integer digits and exactly two
/// fraction digits.
fn two_decimal_parts(value: Decimal) -> (String, String) {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let s = rounded.to_string();
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s.as_str(), ""));
    let mut frac: String = frac_part.chars().take(2).collect();
    while frac.len() < 2 {
        frac.push('0');
    }
    (int_part.to_string(), frac)
}

/// Format a money value, e.g. `₺1.234,56` or `-₺12,00`.
pub fn format_currency(value: Decimal, symbol: &str) -> String {
    let negative = value.is_sign_negative()
        && !value
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .is_zero();
    let (int_part, frac) = two_decimal_parts(value.abs());

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(symbol);
    out.push_str(&group_int_digits(&int_part, '.'));
    out.push(',');
    out.push_str(&frac);
    out
}

/// Amount with its direction sign: `+₺5.000,00` for income, `-₺120,50` for
/// expense.
pub fn format_signed_amount(entry: &impl MoneyFlow, symbol: &str) -> String {
    let sign = match entry.kind() {
        TransactionType::Income => '+',
        TransactionType::Expense => '-',
    };
    format!("{sign}{}", format_currency(entry.amount().abs(), symbol))
}

pub fn month_label(month: u32) -> &'static str {
    MONTH_SHORT
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("?")
}

/// Medium-style date, e.g. `18 Eki 2026`.
pub fn format_date(date: NaiveDate) -> String {
    format!("{} {} {}", date.day(), month_label(date.month()), date.year())
}

/// Parse a typed or extracted amount.
///
/// Accepts plain decimals (`1234.50`), Turkish grouping (`1.234,50`),
/// comma decimals (`12,5`), an optional leading `-` and currency markers
/// (`₺`, `TL`, `TRY`). When both separators appear, the last one is the
/// decimal separator.
pub fn parse_amount(input: &str) -> Option<Decimal> {
    let mut s: String = input
        .replace("TRY", "")
        .replace("TL", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '₺' && *c != '\u{a0}')
        .collect();
    if s.is_empty() {
        return None;
    }

    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');
    s = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (None, Some(_)) if s.matches(',').count() == 1 => s.replace(',', "."),
        (None, Some(_)) => s.replace(',', ""),
        (Some(_), None) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s,
    };

    s.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(&s).ok())
}

/// Merge style-class lists into one space-separated string.
///
/// Tokens are split on whitespace and empty entries dropped. When a token
/// repeats, the later occurrence wins its position.
pub fn merge_classes(inputs: &[&str]) -> String {
    let mut tokens: Vec<&str> = Vec::new();
    for token in inputs.iter().flat_map(|s| s.split_whitespace()) {
        tokens.retain(|existing| *existing != token);
        tokens.push(token);
    }
    tokens.join(" ")
}
