//! External collaborators of the FlowMentor workflow engine.
//!
//! This crate provides:
//!
//! - **Document store**: keyed JSON documents grouped in collections, with
//!   insert-if-absent and simple filtered queries
//! - **Notifier**: outbound user notifications carrying an idempotency key
//!
//! Both come with in-process implementations used in development and tests.

pub mod error;
pub mod notify;
pub mod store;

pub use error::{NotifyError, StoreError};
pub use notify::{LogNotifier, Notification, Notifier, RecordingNotifier};
pub use store::{DocumentFilter, DocumentStore, InMemoryDocumentStore, StoredDocument};
