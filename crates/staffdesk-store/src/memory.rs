//! In-memory [`RecordSource`] with scripted latency and failures.
//!
//! Every call is addressed by a [`Route`]. A route can be given a queue of
//! [`Behavior`]s; each call consumes the front one, and the last one sticks.
//! Unscripted routes answer immediately. Delays use `tokio::time`, so tests
//! running on a paused clock are fully deterministic.
//!
//! Data is read when a call finishes, not when it starts, and every finished
//! call is counted even if nobody is waiting for it any more.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use staffdesk_shared::{Document, TransportError};

use crate::source::{apply_partial, sub_path, RecordSource};

/// Identifies one kind of call against one path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Get(String),
    List(String),
    Update(String),
    Add(String),
    UpdateSub(String),
}

impl Route {
    pub fn get(collection: &str, id: &str) -> Self {
        Self::Get(format!("{collection}/{id}"))
    }

    pub fn list(collection: &str, id: &str, subcollection: &str) -> Self {
        Self::List(sub_path(collection, id, subcollection))
    }

    pub fn update(collection: &str, id: &str) -> Self {
        Self::Update(format!("{collection}/{id}"))
    }

    pub fn add(collection: &str, id: &str, subcollection: &str) -> Self {
        Self::Add(sub_path(collection, id, subcollection))
    }

    pub fn update_sub(collection: &str, id: &str, subcollection: &str, sub_id: &str) -> Self {
        Self::UpdateSub(format!("{}/{sub_id}", sub_path(collection, id, subcollection)))
    }
}

/// How a scripted call behaves.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Answer from the stored data after `delay`.
    Respond { delay: Duration },
    /// Fail with `error` after `delay`.
    Fail {
        delay: Duration,
        error: TransportError,
    },
    /// Never answer.
    Hang,
}

impl Behavior {
    pub fn delay_ms(ms: u64) -> Self {
        Self::Respond {
            delay: Duration::from_millis(ms),
        }
    }

    pub fn fail(error: TransportError) -> Self {
        Self::Fail {
            delay: Duration::ZERO,
            error,
        }
    }

    pub fn fail_after_ms(ms: u64, error: TransportError) -> Self {
        Self::Fail {
            delay: Duration::from_millis(ms),
            error,
        }
    }
}

/// A write the source accepted, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub route: Route,
    pub fields: Map<String, Value>,
}

#[derive(Default)]
struct Inner {
    /// collection path -> documents in insertion order
    collections: HashMap<String, Vec<Document>>,
    scripts: HashMap<Route, VecDeque<Behavior>>,
    started: HashMap<Route, usize>,
    completed: HashMap<Route, usize>,
    writes: Vec<RecordedWrite>,
}

#[derive(Default)]
pub struct ScriptedSource {
    inner: Mutex<Inner>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a document under `collection/id`, replacing any previous one.
    pub fn put(&self, collection: &str, id: &str, fields: Map<String, Value>) {
        let mut inner = self.lock();
        let docs = inner.collections.entry(collection.to_string()).or_default();
        docs.retain(|doc| doc.id != id);
        docs.push(Document::new(id, fields));
    }

    /// Append a document to a sub-collection under a known id.
    pub fn put_sub(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        sub_id: &str,
        fields: Map<String, Value>,
    ) {
        self.put(&sub_path(collection, id, subcollection), sub_id, fields);
    }

    /// Queue behaviours for a route.
    pub fn script(&self, route: Route, behaviors: impl IntoIterator<Item = Behavior>) {
        self.lock()
            .scripts
            .entry(route)
            .or_default()
            .extend(behaviors);
    }

    /// Drop every scripted behaviour; all routes answer immediately again.
    pub fn clear_scripts(&self) {
        self.lock().scripts.clear();
    }

    pub fn started(&self, route: &Route) -> usize {
        self.lock().started.get(route).copied().unwrap_or(0)
    }

    /// Calls that ran to completion, whether or not anyone still awaited them.
    pub fn completed(&self, route: &Route) -> usize {
        self.lock().completed.get(route).copied().unwrap_or(0)
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.lock().writes.clone()
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id).cloned())
    }

    fn next_behavior(&self, route: &Route) -> Option<Behavior> {
        let mut inner = self.lock();
        *inner.started.entry(route.clone()).or_insert(0) += 1;
        let queue = inner.scripts.get_mut(route)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    /// Wait out the scripted behaviour, then run `op` against the data.
    async fn perform<T>(
        &self,
        route: Route,
        op: impl FnOnce(&mut Inner) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let outcome = match self.next_behavior(&route) {
            None => Ok(()),
            Some(Behavior::Respond { delay }) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Some(Behavior::Fail { delay, error }) => {
                tokio::time::sleep(delay).await;
                Err(error)
            }
            Some(Behavior::Hang) => std::future::pending().await,
        };

        let mut inner = self.lock();
        *inner.completed.entry(route).or_insert(0) += 1;
        outcome?;
        op(&mut *inner)
    }
}

impl Inner {
    fn find(&self, path: &str, id: &str) -> Option<&Document> {
        self.collections
            .get(path)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id))
    }

    fn find_mut(&mut self, path: &str, id: &str) -> Option<&mut Document> {
        self.collections
            .get_mut(path)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.id == id))
    }

    fn require_parent(&self, collection: &str, id: &str) -> Result<(), TransportError> {
        match self.find(collection, id) {
            Some(_) => Ok(()),
            None => Err(TransportError::NotFound(format!("{collection}/{id}"))),
        }
    }
}

#[async_trait]
impl RecordSource for ScriptedSource {
    async fn get_record(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, TransportError> {
        self.perform(Route::get(collection, id), |inner| {
            Ok(inner.find(collection, id).cloned())
        })
        .await
    }

    async fn list_sub_records(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
    ) -> Result<Vec<Document>, TransportError> {
        let path = sub_path(collection, id, subcollection);
        self.perform(Route::list(collection, id, subcollection), |inner| {
            inner.require_parent(collection, id)?;
            Ok(inner.collections.get(&path).cloned().unwrap_or_default())
        })
        .await
    }

    async fn update_record(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), TransportError> {
        let route = Route::update(collection, id);
        self.perform(route.clone(), |inner| {
            let doc = inner
                .find_mut(collection, id)
                .ok_or_else(|| TransportError::NotFound(format!("{collection}/{id}")))?;
            apply_partial(&mut doc.fields, fields.clone());
            inner.writes.push(RecordedWrite { route, fields });
            Ok(())
        })
        .await
    }

    async fn add_sub_record(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        fields: Map<String, Value>,
    ) -> Result<String, TransportError> {
        let route = Route::add(collection, id, subcollection);
        let path = sub_path(collection, id, subcollection);
        self.perform(route.clone(), |inner| {
            inner.require_parent(collection, id)?;
            let new_id = Uuid::new_v4().to_string();
            inner
                .collections
                .entry(path)
                .or_default()
                .push(Document::new(new_id.clone(), fields.clone()));
            inner.writes.push(RecordedWrite { route, fields });
            Ok(new_id)
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
    ) -> Result<(), TransportError> {
        let route = Route::update_sub(collection, id, subcollection, sub_id);
        let path = sub_path(collection, id, subcollection);
        self.perform(route.clone(), |inner| {
            let doc = inner
                .find_mut(&path, sub_id)
                .ok_or_else(|| TransportError::NotFound(format!("{path}/{sub_id}")))?;
            apply_partial(&mut doc.fields, fields.clone());
            inner.writes.push(RecordedWrite { route, fields });
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_delay_then_last_behavior_sticks() {
        let source = ScriptedSource::new();
        source.put("employees", "e1", fields(json!({"name": "Amina"})));
        source.script(
            Route::get("employees", "e1"),
            [
                Behavior::fail(TransportError::Network("offline".into())),
                Behavior::delay_ms(100),
            ],
        );

        let err = source.get_record("employees", "e1").await.unwrap_err();
        assert_eq!(err, TransportError::Network("offline".into()));

        let start = tokio::time::Instant::now();
        assert!(source.get_record("employees", "e1").await.unwrap().is_some());
        assert!(start.elapsed() >= Duration::from_millis(100));

        // Second scripted behaviour is now permanent.
        assert!(source.get_record("employees", "e1").await.unwrap().is_some());
        assert_eq!(source.completed(&Route::get("employees", "e1")), 3);
    }

    #[tokio::test]
    async fn list_reports_missing_parent() {
        let source = ScriptedSource::new();
        let err = source
            .list_sub_records("employees", "ghost", "advances")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotFound(_)));
    }

    #[tokio::test]
    async fn writes_are_recorded_and_applied() {
        let source = ScriptedSource::new();
        source.put(
            "employees",
            "e1",
            fields(json!({"name": "Amina", "salary": 7000})),
        );

        source
            .update_record("employees", "e1", fields(json!({"salary": 9000})))
            .await
            .unwrap();

        let writes = source.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].route, Route::update("employees", "e1"));
        assert_eq!(writes[0].fields, fields(json!({"salary": 9000})));

        let doc = source.document("employees", "e1").unwrap();
        assert_eq!(doc.fields["salary"], json!(9000));
        assert_eq!(doc.fields["name"], json!("Amina"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_route_never_completes() {
        let source = ScriptedSource::new();
        source.put("employees", "e1", fields(json!({"name": "Amina"})));
        source.script(Route::get("employees", "e1"), [Behavior::Hang]);

        let result = tokio::time::timeout(
            Duration::from_secs(60),
            source.get_record("employees", "e1"),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(source.started(&Route::get("employees", "e1")), 1);
        assert_eq!(source.completed(&Route::get("employees", "e1")), 0);
    }
}
