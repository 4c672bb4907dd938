//! Vela Storage - Change events and storage collaborators for Vela.
//!
//! This crate provides the storage side of the reactive query layer:
//!
//! - `ChangeEventBuffer`: bounded, per-collection log of committed writes
//! - `StorageExecutor`: full query execution against ground truth
//! - `DocumentStore`: synchronous document writes
//! - `MemoryStorage`: an in-memory backend implementing both
//!
//! # Example
//!
//! ```rust
//! use vela_core::{ChangeKind, Document};
//! use vela_storage::ChangeEventBuffer;
//! use serde_json::json;
//!
//! let buffer = ChangeEventBuffer::new("users", 100);
//! let doc = Document::new("id", json!({"id": "alice"})).unwrap();
//! buffer.append(ChangeKind::Insert, None, Some(doc));
//!
//! assert_eq!(buffer.counter(), 1);
//! assert_eq!(buffer.get_from(1).unwrap().len(), 1);
//! ```

pub mod change_buffer;
pub mod executor;
pub mod memory;

pub use change_buffer::ChangeEventBuffer;
pub use executor::{DocumentStore, StorageBackend, StorageExecutor};
pub use memory::MemoryStorage;
