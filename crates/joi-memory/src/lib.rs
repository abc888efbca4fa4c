//! `joi-memory` – everything Joi remembers between sessions.
//!
//! # Modules
//!
//! - [`document`] – [`DocumentStore`][document::DocumentStore]: the narrow
//!   get/set blob contract the stores persist through, with file-per-key
//!   and SQLite implementations.
//! - [`facts`] – [`FactStore`][facts::FactStore]: structured personal
//!   knowledge for one user identity, addressable by dotted path or as
//!   subject-relation-object triples, flattened deterministically for
//!   prompt injection.
//! - [`history`] – [`ConversationLog`][history::ConversationLog]: the
//!   ordered, head-trimmed turn sequence replayed into each prompt.
//! - [`tasks`] – [`TaskList`][tasks::TaskList]: the JSON-file task list
//!   behind the `TAREA_*` commands.
//!
//! All stores share one failure philosophy: loading never crashes the
//! process (missing or corrupt state starts empty, with a warning), and a
//! failed persist leaves the in-memory state authoritative.

pub mod document;
pub mod facts;
pub mod history;
pub mod tasks;

pub use document::{DocumentError, DocumentStore, FileDocumentStore, SqliteDocumentStore};
pub use facts::{FactError, FactStore};
pub use history::{ConversationLog, DEFAULT_RETENTION};
pub use tasks::{TaskError, TaskList};
