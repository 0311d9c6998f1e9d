mod id;
mod id_generator;
mod transaction;
mod upload;
mod user;

pub use id::{Id, IdError};
pub use id_generator::{
    DemoIdGenerator, DocumentIdGenerator, FixedIdGenerator, IdGenerator,
};
pub use transaction::{
    category_label, is_suggested_category, is_valid_category, newest_first, parse_occurrence_date,
    sort_newest_first, InvalidTransaction, MoneyFlow, NewTransaction, Transaction,
    TransactionType, DEFAULT_CATEGORY, FALLBACK_CATEGORY, MAX_AMOUNT, SUGGESTED_CATEGORIES,
};
pub use upload::{content_type_for, Upload, DEFAULT_CONTENT_TYPE};
pub use user::{User, DEMO_USER_ID};
