//! Core entity trait that all cached catalog records must implement.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::hash::Hash;
use std::str::FromStr;

/// Trait that all entities stored in the catalog and its cache must implement.
///
/// Entities are identified in the cache by their *secondary key*: a
/// domain-unique field such as a book's name, distinct from the
/// store-assigned primary key.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use catalog_cache::CacheEntity;
///
/// #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// pub struct Journal {
///     pub issn: String,
///     pub title: String,
/// }
///
/// impl CacheEntity for Journal {
///     type Key = String;
///
///     fn secondary_key(&self) -> Self::Key {
///         self.issn.clone()
///     }
///
///     fn cache_prefix() -> &'static str {
///         "journal"
///     }
///
///     fn collection_name() -> &'static str {
///         "journals"
///     }
///
///     fn key_field() -> &'static str {
///         "issn"
///     }
/// }
/// ```
pub trait CacheEntity:
    Send + Sync + Serialize + DeserializeOwned + Clone + PartialEq + 'static
{
    /// Type of the secondary key (usually `String`).
    type Key: Display
        + FromStr
        + Serialize
        + Clone
        + Send
        + Sync
        + Eq
        + Hash
        + 'static;

    /// Return the entity's secondary key.
    fn secondary_key(&self) -> Self::Key;

    /// Return the cache prefix for this entity kind.
    ///
    /// Used to namespace cache keys. Example: "book", "user".
    fn cache_prefix() -> &'static str;

    /// Name of the store collection holding this entity kind.
    fn collection_name() -> &'static str;

    /// Name of the document field carrying the secondary key.
    ///
    /// Also used as the query parameter name on the HTTP surface.
    fn key_field() -> &'static str;

    /// Optional: Validate entity before it is written.
    ///
    /// The default rejects an empty secondary key.
    fn validate(&self) -> Result<()> {
        if self.secondary_key().to_string().trim().is_empty() {
            return Err(Error::ValidationError(format!(
                "{} must not be empty",
                Self::key_field()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct TestEntity {
        code: String,
        value: String,
    }

    impl CacheEntity for TestEntity {
        type Key = String;

        fn secondary_key(&self) -> Self::Key {
            self.code.clone()
        }

        fn cache_prefix() -> &'static str {
            "test"
        }

        fn collection_name() -> &'static str {
            "tests"
        }

        fn key_field() -> &'static str {
            "code"
        }
    }

    #[test]
    fn test_secondary_key() {
        let entity = TestEntity {
            code: "entity_123".to_string(),
            value: "test".to_string(),
        };

        assert_eq!(entity.secondary_key(), "entity_123");
        assert_eq!(TestEntity::cache_prefix(), "test");
        assert_eq!(TestEntity::collection_name(), "tests");
    }

    #[test]
    fn test_default_validation_rejects_blank_key() {
        let entity = TestEntity {
            code: "  ".to_string(),
            value: "x".to_string(),
        };

        match entity.validate() {
            Err(Error::ValidationError(msg)) => assert_eq!(msg, "code must not be empty"),
            other => panic!("Expected ValidationError, got {:?}", other),
        }

        let entity = TestEntity {
            code: "ok".to_string(),
            value: "x".to_string(),
        };
        assert!(entity.validate().is_ok());
    }
}
