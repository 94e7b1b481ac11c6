//! # staffdesk-store
//!
//! Document-store access for staffdesk.
//!
//! The client only ever talks to a [`RecordSource`]. Two implementations live
//! here: [`SqliteSource`], a local document database backed by SQLite, and
//! [`ScriptedSource`], an in-memory store whose latency and failures can be
//! scripted per call.

pub mod database;
pub mod documents;
pub mod memory;
pub mod migrations;
pub mod source;
pub mod sqlite;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use memory::{Behavior, RecordedWrite, Route, ScriptedSource};
pub use source::{sub_path, RecordSource};
pub use sqlite::SqliteSource;
