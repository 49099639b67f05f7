//! Document persistence.
//!
//! Documents are the unit of storage: each one carries its metadata section,
//! its text (or transcript) fragments and its images, every vector already
//! transport-encoded. The vector spaces are rebuilt from the store at startup.
//!
//! # Implementations
//!
//! - [`JsonDirStore`] - one `{id}.json` file per document
//! - [`InMemoryDocumentStore`] - no persistence, for tests

mod document_store;
mod json_store;
mod types;

pub use document_store::{DocumentStore, InMemoryDocumentStore};
pub use json_store::JsonDirStore;
pub use types::{
    DocumentBody, Fragment, ImageFragment, MediaKind, MetadataEntry, MetadataRecord, OrderedMap,
    StoredDocument, EMBEDDING_KEY,
};
