use std::collections::VecDeque;
use std::sync::Mutex;

use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;

use super::Id;

/// Abstraction over id generation to support deterministic tests.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> Id;
}

/// Short random tokens for demo-mode records (9 base-36 characters).
#[derive(Debug, Clone, Default)]
pub struct DemoIdGenerator;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const DEMO_ID_LEN: usize = 9;

impl IdGenerator for DemoIdGenerator {
    fn new_id(&self) -> Id {
        let mut rng = rand::thread_rng();
        let token: String = (0..DEMO_ID_LEN)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();
        Id::from_string(token)
    }
}

/// Client-side document ids in the shape the document store assigns
/// (20 alphanumeric characters).
#[derive(Debug, Clone, Default)]
pub struct DocumentIdGenerator;

const DOCUMENT_ID_LEN: usize = 20;

impl IdGenerator for DocumentIdGenerator {
    fn new_id(&self) -> Id {
        Id::from_string(Alphanumeric.sample_string(&mut rand::thread_rng(), DOCUMENT_ID_LEN))
    }
}

/// A deterministic generator that returns a pre-seeded sequence of ids.
///
/// Panics if you request more ids than provided.
#[derive(Debug, Default)]
pub struct FixedIdGenerator {
    ids: Mutex<VecDeque<Id>>,
}

impl FixedIdGenerator {
    pub fn new(ids: impl IntoIterator<Item = Id>) -> Self {
        Self {
            ids: Mutex::new(ids.into_iter().collect()),
        }
    }
}

impl IdGenerator for FixedIdGenerator {
    fn new_id(&self) -> Id {
        self.ids
            .lock()
            .expect("fixed id generator lock poisoned")
            .pop_front()
            .expect("fixed id generator exhausted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_ids_are_short_base36_tokens() {
        let id = DemoIdGenerator.new_id();
        assert_eq!(id.as_str().len(), 9);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn document_ids_are_alphanumeric() {
        let id = DocumentIdGenerator.new_id();
        assert_eq!(id.as_str().len(), 20);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn fixed_generator_replays_in_order() {
        let ids = FixedIdGenerator::new([Id::from("a"), Id::from("b")]);
        assert_eq!(ids.new_id().as_str(), "a");
        assert_eq!(ids.new_id().as_str(), "b");
    }
}
