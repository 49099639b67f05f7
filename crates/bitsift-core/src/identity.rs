//! Fragment identity scheme.
//!
//! Every point in a vector space carries a string id that leads back to its
//! owning document:
//!
//! - text fragment: `{documentId}_text_{ordinal}`
//! - image fragment: `{documentId}_image_{ordinal}`
//! - metadata record: `{documentId}` itself
//!
//! Ordinals are 1-based and assigned once, when the document is created.

const TEXT_MARKER: &str = "_text_";
const IMAGE_MARKER: &str = "_image_";

/// Builds the id of the `ordinal`-th text fragment of a document.
pub fn make_text_id(document_id: &str, ordinal: usize) -> String {
    format!("{document_id}{TEXT_MARKER}{ordinal}")
}

/// Builds the id of the `ordinal`-th image fragment of a document.
pub fn make_image_id(document_id: &str, ordinal: usize) -> String {
    format!("{document_id}{IMAGE_MARKER}{ordinal}")
}

/// Resolves the document that owns a point id.
///
/// Splits at the first `_text_`, else at the first `_image_`. An id with
/// neither marker is a document id.
pub fn owning_document_of(id: &str) -> &str {
    if let Some((doc, _)) = id.split_once(TEXT_MARKER) {
        return doc;
    }
    if let Some((doc, _)) = id.split_once(IMAGE_MARKER) {
        return doc;
    }
    id
}
