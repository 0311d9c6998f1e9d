//! Field-level merge of AI suggestions into form state.
//!
//! Each form field remembers where its value came from. A suggestion may
//! replace a default or an earlier suggestion, but never a non-empty value
//! the user typed.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::format::parse_amount;

/// Origin of a field's current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldSource {
    #[default]
    Default,
    Suggested,
    User,
}

/// Values that can count as "not filled in".
pub trait EmptyEquivalent {
    fn is_empty_equivalent(&self) -> bool;
}

impl EmptyEquivalent for String {
    fn is_empty_equivalent(&self) -> bool {
        self.trim().is_empty()
    }
}

impl EmptyEquivalent for NaiveDate {
    fn is_empty_equivalent(&self) -> bool {
        false
    }
}

/// Amount as typed. Kept as text so half-typed input survives a failed
/// submit unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AmountText(pub String);

impl AmountText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn from_decimal(value: Decimal) -> Self {
        Self(value.normalize().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(&self) -> Option<Decimal> {
        parse_amount(&self.0)
    }
}

impl EmptyEquivalent for AmountText {
    /// Blank, zero, or anything that does not parse.
    fn is_empty_equivalent(&self) -> bool {
        self.parse().map_or(true, |v| v.is_zero())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField<T> {
    value: T,
    source: FieldSource,
}

impl<T: EmptyEquivalent> FormField<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            source: FieldSource::Default,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn source(&self) -> FieldSource {
        self.source
    }

    pub fn edit(&mut self, value: T) {
        self.value = value;
        self.source = FieldSource::User;
    }

    /// Apply an AI suggestion. Returns whether the field changed hands.
    pub fn apply_suggestion(&mut self, suggestion: T) -> bool {
        if self.source == FieldSource::User && !self.value.is_empty_equivalent() {
            return false;
        }
        self.value = suggestion;
        self.source = FieldSource::Suggested;
        true
    }
}

impl<T: EmptyEquivalent + Default> Default for FormField<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
