//! Catalog records: books and users.

use crate::entity::CacheEntity;
use serde::{Deserialize, Serialize};

/// A book, identified in the catalog by its name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Store-assigned primary key. Absent on records the client has not read back.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub publisher: String,
}

impl CacheEntity for Book {
    type Key = String;

    fn secondary_key(&self) -> Self::Key {
        self.name.clone()
    }

    fn cache_prefix() -> &'static str {
        "book"
    }

    fn collection_name() -> &'static str {
        "books"
    }

    fn key_field() -> &'static str {
        "name"
    }
}

/// A library user, identified in the catalog by username.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<String>,
    /// Full name.
    #[serde(default)]
    pub fio: String,
    #[serde(default)]
    pub gender: String,
    pub username: String,
}

impl CacheEntity for User {
    type Key = String;

    fn secondary_key(&self) -> Self::Key {
        self.username.clone()
    }

    fn cache_prefix() -> &'static str {
        "user"
    }

    fn collection_name() -> &'static str {
        "users"
    }

    fn key_field() -> &'static str {
        "username"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_from_partial_json() {
        let book: Book = serde_json::from_str(
            r#"{"name":"Dune","author":"Herbert","year":1965,"publisher":"Chilton"}"#,
        )
        .expect("Failed to parse book");

        assert_eq!(book.id, None);
        assert_eq!(book.description, "");
        assert_eq!(book.secondary_key(), "Dune");
        assert_eq!(book.year, 1965);
    }

    #[test]
    fn test_user_requires_username() {
        let result: Result<User, _> = serde_json::from_str(r#"{"fio":"Ivanov I.I."}"#);
        assert!(result.is_err());

        let user: User = serde_json::from_str(r#"{"fio":"Ivanov I.I.","username":"ivanov"}"#)
            .expect("Failed to parse user");
        assert_eq!(user.secondary_key(), "ivanov");
        assert_eq!(User::key_field(), "username");
    }
}
