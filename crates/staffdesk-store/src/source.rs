//! The document-store interface consumed by the client.
//!
//! Implementations may be slow, fail, or never answer. Callers bound every
//! call themselves; nothing here imposes a deadline.

use async_trait::async_trait;
use serde_json::{Map, Value};

use staffdesk_shared::{Document, TransportError};

/// Key-value access to named collections and their sub-collections.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch one document. `Ok(None)` when it does not exist.
    async fn get_record(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, TransportError>;

    /// List a document's sub-collection in insertion order.
    ///
    /// Fails with [`TransportError::NotFound`] when the parent is missing.
    async fn list_sub_records(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
    ) -> Result<Vec<Document>, TransportError>;

    /// Overwrite the given top-level fields. Nested objects are replaced, not
    /// merged.
    async fn update_record(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), TransportError>;

    /// Append a document to a sub-collection and return its new id.
    async fn add_sub_record(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        fields: Map<String, Value>,
    ) -> Result<String, TransportError>;

    /// Overwrite top-level fields of one sub-collection document.
    async fn update_sub_record(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        sub_id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), TransportError>;
}

/// Collection path of a document's sub-collection, e.g. `employees/e1/advances`.
pub fn sub_path(collection: &str, id: &str, subcollection: &str) -> String {
    format!("{collection}/{id}/{subcollection}")
}

/// Replace top-level keys of `body` with those in `fields`.
pub fn apply_partial(body: &mut Map<String, Value>, fields: Map<String, Value>) {
    for (key, value) in fields {
        body.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_update_replaces_nested_objects_wholesale() {
        let Value::Object(mut body) = json!({
            "name": "Amina",
            "passport": { "number": "P1", "expiry": "2030-01-01" }
        }) else {
            unreachable!()
        };
        let Value::Object(patch) = json!({ "passport": { "number": "P2" } }) else {
            unreachable!()
        };

        apply_partial(&mut body, patch);

        assert_eq!(body["name"], json!("Amina"));
        assert_eq!(body["passport"], json!({ "number": "P2" }));
    }

    #[test]
    fn sub_path_format() {
        assert_eq!(sub_path("employees", "e1", "advances"), "employees/e1/advances");
    }
}
