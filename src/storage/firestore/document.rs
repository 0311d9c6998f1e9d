//! Mapping between transactions and the document store's typed JSON values.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{Id, NewTransaction, Transaction, TransactionType, User, MAX_AMOUNT};

pub(super) type Fields = BTreeMap<String, Value>;

/// A document as returned by reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Document {
    pub name: String,
    #[serde(default)]
    pub fields: Fields,
    #[serde(default)]
    pub create_time: Option<String>,
}

/// One element of a `runQuery` response stream.
#[derive(Debug, Deserialize)]
pub(super) struct QueryRow {
    #[serde(default)]
    pub document: Option<Document>,
}

pub(super) fn string_value(value: &str) -> Value {
    json!({ "stringValue": value })
}

fn optional_string_value(value: Option<&str>) -> Value {
    match value {
        Some(v) => string_value(v),
        None => json!({ "nullValue": null }),
    }
}

/// Fields written for a new transaction; `createdAt` is filled in by the
/// server through a transform.
pub(super) fn transaction_fields(new: &NewTransaction) -> Fields {
    let mut fields = Fields::new();
    fields.insert("title".into(), string_value(&new.title));
    fields.insert(
        "amount".into(),
        json!({ "doubleValue": new.amount.to_f64().unwrap_or_default() }),
    );
    fields.insert("type".into(), string_value(new.kind.as_str()));
    fields.insert("category".into(), string_value(&new.category));
    fields.insert("date".into(), string_value(&new.date.format("%Y-%m-%d").to_string()));
    fields.insert(
        "receiptUrl".into(),
        optional_string_value(new.receipt_url.as_deref()),
    );
    fields
}

pub(super) fn profile_fields(user: &User) -> Fields {
    let mut fields = Fields::new();
    fields.insert(
        "displayName".into(),
        optional_string_value(user.display_name.as_deref()),
    );
    fields.insert("email".into(), optional_string_value(user.email.as_deref()));
    fields.insert(
        "photoURL".into(),
        optional_string_value(user.photo_url.as_deref()),
    );
    fields
}

fn get_string<'a>(fields: &'a Fields, key: &str) -> Option<&'a str> {
    fields.get(key)?.get("stringValue")?.as_str()
}

fn get_amount(fields: &Fields, key: &str) -> Result<Decimal, String> {
    let value = fields.get(key).ok_or_else(|| format!("missing {key}"))?;
    let text = if let Some(n) = value.get("doubleValue") {
        n.to_string()
    } else if let Some(Value::String(s)) = value.get("integerValue") {
        s.clone()
    } else if let Some(Value::String(s)) = value.get("stringValue") {
        s.clone()
    } else {
        return Err(format!("{key} is not a number"));
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| format!("{key} is not a number: {text}"))
}

pub(super) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn get_timestamp(fields: &Fields, key: &str) -> Option<DateTime<Utc>> {
    fields
        .get(key)?
        .get("timestampValue")?
        .as_str()
        .and_then(parse_timestamp)
}

/// Decode one stored transaction. Errors name the offending field.
pub(super) fn transaction_from_document(doc: &Document) -> Result<Transaction, String> {
    let id = Id::from_document_name(&doc.name)
        .ok_or_else(|| format!("unusable document name {:?}", doc.name))?;
    let fields = &doc.fields;

    let title = get_string(fields, "title").unwrap_or_default().to_string();
    let amount = get_amount(fields, "amount")?.abs();
    if amount > MAX_AMOUNT {
        return Err(format!("amount out of range: {amount}"));
    }
    let kind = match get_string(fields, "type") {
        Some(raw) => TransactionType::from_str(raw).map_err(|e| e.to_string())?,
        None => TransactionType::Expense,
    };
    let category = get_string(fields, "category").unwrap_or_default().to_string();
    let date_raw = get_string(fields, "date").ok_or("missing date")?;
    let date = crate::models::parse_occurrence_date(date_raw)
        .ok_or_else(|| format!("invalid date {date_raw:?}"))?;
    let created_at = get_timestamp(fields, "createdAt")
        .or_else(|| doc.create_time.as_deref().and_then(parse_timestamp))
        .unwrap_or_else(|| fallback_created_at(date));
    let receipt_url = get_string(fields, "receiptUrl")
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(Transaction {
        id,
        title,
        amount,
        kind,
        category,
        date,
        created_at,
        receipt_url,
    })
}

fn fallback_created_at(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Profile fields stored on `users/{uid}`.
pub(super) fn user_from_fields(uid: &str, fields: &Fields) -> User {
    User {
        uid: uid.to_string(),
        display_name: get_string(fields, "displayName").map(str::to_string),
        email: get_string(fields, "email").map(str::to_string),
        photo_url: get_string(fields, "photoURL").map(str::to_string),
    }
}
