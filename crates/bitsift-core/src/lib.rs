//! # Bitsift Core
//!
//! Library for binary-quantized, multi-space vector retrieval.
//!
//! Documents are split into semantic fragments, embedded, sign-quantized to
//! one bit per dimension and registered in three flat vector spaces (text,
//! metadata, image). Queries cascade across the spaces, asking a generator
//! whether the retrieved context suffices, and fall back to live acquisition
//! when it does not.
//!
//! ## Modules
//!
//! - [`codec`] - Sign quantization and the base64 transport encodings
//! - [`identity`] - Point id scheme (`{doc}_text_{n}`, `{doc}_image_{n}`)
//! - [`chunking`] - Embedding-driven semantic chunking
//! - [`storage`] - Document records and the document store trait
//! - [`space`] - Flat exact nearest-neighbour spaces
//! - [`retrieval`] - Space search, hit resolution and the retrieval cascade
//! - [`indexing`] - Document, file and live-source ingestion
//! - [`conversion`] - Plain-text file conversion
//! - [`session`] - Query-session state machine and wire frames
//! - [`collaborators`] - Generator, rewriter, converter and crawler traits
//! - [`context`] - Startup wiring of all the above
//! - [`config`] - Configuration constants and loaders
//! - [`error`] - Error types

pub mod chunking;
pub mod codec;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod conversion;
pub mod embedding;
pub mod error;
pub mod identity;
pub mod indexing;
pub mod retrieval;
pub mod session;
pub mod space;
pub mod storage;

#[cfg(test)]
mod test_utils;

pub use context::{AppContext, Collaborators};
