//! [`RecordSource`] over the local SQLite document database.
//!
//! Each call runs on tokio's blocking pool so a slow disk never stalls the
//! runtime.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use staffdesk_shared::{Document, TransportError};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::source::{sub_path, RecordSource};

#[derive(Clone)]
pub struct SqliteSource {
    db: Arc<Mutex<Database>>,
}

impl SqliteSource {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Insert a top-level document, e.g. when importing employees.
    pub async fn create_record(
        &self,
        collection: &str,
        id: Option<String>,
        fields: Map<String, Value>,
    ) -> std::result::Result<String, TransportError> {
        let collection = collection.to_string();
        self.with_db(move |db| db.insert_document(&collection, id.as_deref(), &fields))
            .await
    }

    /// Top-level documents of a collection, as a list view would show them.
    pub async fn list_records(
        &self,
        collection: &str,
    ) -> std::result::Result<Vec<Document>, TransportError> {
        let collection = collection.to_string();
        self.with_db(move |db| db.list_documents(&collection)).await
    }

    async fn with_db<T, F>(&self, f: F) -> std::result::Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = db.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))
        .and_then(|inner| inner);

        result.map_err(TransportError::from)
    }
}

#[async_trait]
impl RecordSource for SqliteSource {
    async fn get_record(
        &self,
        collection: &str,
        id: &str,
    ) -> std::result::Result<Option<Document>, TransportError> {
        debug!(collection, id, "get_record");
        let (collection, id) = (collection.to_string(), id.to_string());
        self.with_db(move |db| db.get_document(&collection, &id)).await
    }

    async fn list_sub_records(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
    ) -> std::result::Result<Vec<Document>, TransportError> {
        debug!(collection, id, subcollection, "list_sub_records");
        let path = sub_path(collection, id, subcollection);
        let (collection, id) = (collection.to_string(), id.to_string());
        self.with_db(move |db| {
            if !db.document_exists(&collection, &id)? {
                return Err(StoreError::NotFound(format!("{collection}/{id}")));
            }
            db.list_documents(&path)
        })
        .await
    }

    async fn update_record(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> std::result::Result<(), TransportError> {
        debug!(collection, id, keys = fields.len(), "update_record");
        let (collection, id) = (collection.to_string(), id.to_string());
        self.with_db(move |db| db.merge_document(&collection, &id, fields))
            .await
    }

    async fn add_sub_record(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        fields: Map<String, Value>,
    ) -> std::result::Result<String, TransportError> {
        debug!(collection, id, subcollection, "add_sub_record");
        let path = sub_path(collection, id, subcollection);
        let (collection, id) = (collection.to_string(), id.to_string());
        self.with_db(move |db| {
            if !db.document_exists(&collection, &id)? {
                return Err(StoreError::NotFound(format!("{collection}/{id}")));
            }
            db.insert_document(&path, None, &fields)
        })
        .await
    }

    async fn update_sub_record(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        sub_id: &str,
        fields: Map<String, Value>,
    ) -> std::result::Result<(), TransportError> {
        debug!(collection, id, subcollection, sub_id, "update_sub_record");
        let path = sub_path(collection, id, subcollection);
        let sub_id = sub_id.to_string();
        self.with_db(move |db| db.merge_document(&path, &sub_id, fields))
            .await
    }
}
