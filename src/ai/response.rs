//! Decoding of model output into receipt and statement records.

use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::format::parse_amount;
use crate::models::{parse_occurrence_date, TransactionType};

use super::{AiError, ReceiptScan, StatementEntry};

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?i)```(?:json)?").expect("valid fence regex"))
}

/// Remove markdown code fences (```` ```json ```` / ```` ``` ````) the model
/// tends to wrap its JSON in.
pub fn strip_code_fences(text: &str) -> String {
    fence_regex().replace_all(text, "").trim().to_string()
}

fn parse_json(text: &str) -> Result<Value, AiError> {
    let clean = strip_code_fences(text);
    if clean.is_empty() {
        return Err(AiError::Parse("empty response".to_string()));
    }
    serde_json::from_str(&clean).map_err(|e| {
        tracing::warn!(error = %e, "AI response is not valid JSON");
        AiError::Parse(format!("not valid JSON ({e})"))
    })
}

fn amount_from_value(value: &Value) -> Result<Option<Decimal>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            let text = n.to_string();
            parse_amount(&text)
                .map(Some)
                .ok_or_else(|| format!("invalid amount {text}"))
        }
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_amount(s)
            .map(Some)
            .ok_or_else(|| format!("invalid amount {s:?}")),
        other => Err(format!("invalid amount {other}")),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

const RECEIPT_KEYS: [&str; 6] = ["title", "merchant", "amount", "date", "category_guess", "category"];

#[derive(Debug, Deserialize)]
struct RawReceipt {
    #[serde(default, alias = "merchant")]
    title: Option<String>,
    #[serde(default)]
    amount: Value,
    #[serde(default)]
    date: Option<String>,
    #[serde(default, alias = "category")]
    category_guess: Option<String>,
}

/// Parse a single-receipt response: one JSON object with `title` (or the
/// older `merchant`), `amount`, `date` and `category_guess`.
pub fn parse_receipt(text: &str) -> Result<ReceiptScan, AiError> {
    let value = match parse_json(text)? {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    let Some(object) = value.as_object() else {
        return Err(AiError::Parse("expected a JSON object".to_string()));
    };
    if !RECEIPT_KEYS.iter().any(|key| object.contains_key(*key)) {
        return Err(AiError::Parse("object has none of the receipt fields".to_string()));
    }

    let raw: RawReceipt =
        serde_json::from_value(value).map_err(|e| AiError::Parse(e.to_string()))?;
    let amount = amount_from_value(&raw.amount)
        .map_err(AiError::Parse)?
        .map(|a| a.abs());

    Ok(ReceiptScan {
        title: non_blank(raw.title),
        amount,
        date: raw.date.as_deref().and_then(parse_occurrence_date),
        category_guess: non_blank(raw.category_guess).map(|c| c.to_lowercase()),
    })
}

#[derive(Debug, Deserialize)]
struct RawStatementEntry {
    #[serde(default)]
    date: Option<String>,
    #[serde(default, alias = "merchant", alias = "description")]
    title: Option<String>,
    #[serde(default)]
    amount: Value,
    #[serde(default, rename = "type", alias = "kind")]
    kind: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

/// Parse a statement response: a JSON array of entries, or an object whose
/// `transactions` field holds that array.
///
/// Entries without a recognizable type are expenses; the stored amount is
/// always the magnitude.
pub fn parse_statement(text: &str) -> Result<Vec<StatementEntry>, AiError> {
    let items = match parse_json(text)? {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("transactions") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(AiError::Parse(
                    "expected a JSON array of transactions".to_string(),
                ))
            }
        },
        _ => {
            return Err(AiError::Parse(
                "expected a JSON array of transactions".to_string(),
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let raw: RawStatementEntry = serde_json::from_value(item)
                .map_err(|e| AiError::Parse(format!("entry {index}: {e}")))?;
            let amount = amount_from_value(&raw.amount)
                .map_err(|e| AiError::Parse(format!("entry {index}: {e}")))?
                .ok_or_else(|| AiError::Parse(format!("entry {index}: missing amount")))?;
            let kind = raw
                .kind
                .as_deref()
                .and_then(TransactionType::parse_lenient)
                .unwrap_or(TransactionType::Expense);
            Ok(StatementEntry {
                date: raw.date.as_deref().and_then(parse_occurrence_date),
                title: raw.title.unwrap_or_default().trim().to_string(),
                amount: amount.abs(),
                kind,
                category: non_blank(raw.category).map(|c| c.to_lowercase()),
            })
        })
        .collect()
}
