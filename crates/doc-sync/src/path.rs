//! Collection and document path parsing.
//!
//! Paths are `/`-separated. Collections have an odd number of segments
//! (`messages`, `users/u1/notes`), documents an even number
//! (`messages/abc`).

use crate::store::{Result, StoreError};

/// A parsed document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    collection: String,
    id: String,
}

impl DocPath {
    pub fn parse(path: &str) -> Result<Self> {
        let segments = segments(path)?;
        if segments.len() % 2 != 0 {
            return Err(StoreError::InvalidPath(format!(
                "`{path}` is a collection path, expected a document path"
            )));
        }
        let (id, collection) = segments
            .split_last()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        Ok(Self {
            collection: collection.join("/"),
            id: (*id).to_string(),
        })
    }

    /// Path of the collection holding this document.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Validate and normalize a collection path.
pub fn collection_path(path: &str) -> Result<String> {
    let segments = segments(path)?;
    if segments.len() % 2 == 0 {
        return Err(StoreError::InvalidPath(format!(
            "`{path}` is a document path, expected a collection path"
        )));
    }
    Ok(segments.join("/"))
}

/// Join a collection path and a document id.
pub fn doc_path(collection: &str, id: &str) -> String {
    format!("{}/{}", collection.trim_matches('/'), id)
}

fn segments(path: &str) -> Result<Vec<&str>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::InvalidPath("path is empty".to_string()));
    }
    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(format!(
            "`{path}` contains an empty segment"
        )));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document_path() {
        let path = DocPath::parse("messages/abc").unwrap();
        assert_eq!(path.collection(), "messages");
        assert_eq!(path.id(), "abc");

        let nested = DocPath::parse("/users/u1/notes/n1/").unwrap();
        assert_eq!(nested.collection(), "users/u1/notes");
        assert_eq!(nested.id(), "n1");
        assert_eq!(nested.to_string(), "users/u1/notes/n1");
    }

    #[test]
    fn test_rejects_wrong_kind() {
        assert!(DocPath::parse("messages").is_err());
        assert!(collection_path("messages/abc").is_err());
        assert_eq!(collection_path("/messages/").unwrap(), "messages");
    }

    #[test]
    fn test_rejects_empty_segments() {
        assert!(matches!(DocPath::parse(""), Err(StoreError::InvalidPath(_))));
        assert!(matches!(
            collection_path("users//notes"),
            Err(StoreError::InvalidPath(_))
        ));
    }
}
