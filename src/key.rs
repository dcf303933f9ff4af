//! Cache key construction.

use crate::entity::CacheEntity;

/// Builds namespaced cache keys for the two cache shapes.
///
/// - single item: `"{prefix}:item:{secondary_key}"`
/// - collection:  `"{prefix}:all"`
///
/// The `item:` segment keeps a record whose key happens to be `"all"` from
/// colliding with the collection entry.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Key of the single-item entry for `key`.
    pub fn item<T: CacheEntity>(key: &T::Key) -> String {
        format!("{}:item:{}", T::cache_prefix(), key)
    }

    /// Key of the whole-collection entry.
    pub fn collection<T: CacheEntity>() -> String {
        format!("{}:all", T::cache_prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Book, User};

    #[test]
    fn test_item_key() {
        assert_eq!(
            CacheKeyBuilder::item::<Book>(&"Dune".to_string()),
            "book:item:Dune"
        );
        assert_eq!(
            CacheKeyBuilder::item::<User>(&"ivanov".to_string()),
            "user:item:ivanov"
        );
    }

    #[test]
    fn test_collection_key_does_not_collide_with_items() {
        let collection = CacheKeyBuilder::collection::<Book>();
        assert_eq!(collection, "book:all");
        assert_ne!(collection, CacheKeyBuilder::item::<Book>(&"all".to_string()));
    }
}
