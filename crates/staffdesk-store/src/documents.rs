use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde_json::{Map, Value};
use uuid::Uuid;

use staffdesk_shared::Document;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::source::apply_partial;

impl Database {
    /// Insert a new document. A fresh UUID is assigned when `id` is `None`.
    pub fn insert_document(
        &self,
        path: &str,
        id: Option<&str>,
        fields: &Map<String, Value>,
    ) -> Result<String> {
        let id = id.map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO documents (path, id, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![path, id, serde_json::to_string(fields)?, now],
        )?;
        Ok(id)
    }

    pub fn get_document(&self, path: &str, id: &str) -> Result<Option<Document>> {
        let body: Option<String> = self
            .conn()
            .query_row(
                "SELECT body FROM documents WHERE path = ?1 AND id = ?2",
                params![path, id],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(Document::new(id, parse_body(&body)?))),
            None => Ok(None),
        }
    }

    pub fn document_exists(&self, path: &str, id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM documents WHERE path = ?1 AND id = ?2",
                params![path, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// All documents of a collection path, oldest first.
    pub fn list_documents(&self, path: &str) -> Result<Vec<Document>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, body FROM documents WHERE path = ?1 ORDER BY rowid ASC")?;

        let rows = stmt.query_map(params![path], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, body) = row?;
            documents.push(Document::new(id, parse_body(&body)?));
        }
        Ok(documents)
    }

    /// Overwrite top-level fields of an existing document.
    pub fn merge_document(
        &mut self,
        path: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<()> {
        let tx = self.conn_mut().transaction()?;

        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE path = ?1 AND id = ?2",
                params![path, id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(body) = body else {
            return Err(StoreError::NotFound(format!("{path}/{id}")));
        };

        let mut body = parse_body(&body)?;
        apply_partial(&mut body, fields);

        tx.execute(
            "UPDATE documents SET body = ?1, updated_at = ?2 WHERE path = ?3 AND id = ?4",
            params![
                serde_json::to_string(&body)?,
                Utc::now().to_rfc3339(),
                path,
                id
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

}

fn parse_body(body: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(body)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Json(serde::de::Error::custom(format!(
            "document body is not an object: {other}"
        )))),
    }
}
