//! Document model persisted by the store.
//!
//! A document is written as one JSON object:
//!
//! ```json
//! {
//!     "id": "doc1",
//!     "metadata": { "url": "...", "doc1": { "title": "...", "embedding": "<base64>" } },
//!     "content": { "doc1_text_1": { "content": "...", "embedding": "<base64>" } },
//!     "images": { "doc1_image_1": { "image_url": "...", "image_alt": "...", "embedding": "<base64>" } }
//! }
//! ```
//!
//! Video transcripts use the `"script"` key in place of `"content"`. Every map
//! keeps its on-disk insertion order across a load/save cycle.

use crate::identity::{make_image_id, make_text_id};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Key under which a metadata record stores its quantized vector.
pub const EMBEDDING_KEY: &str = "embedding";

/// String-keyed map that keeps insertion order.
///
/// Re-inserting an existing key replaces the value in place.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::new();
        while let Some((k, v)) = access.next_entry::<String, V>()? {
            map.insert(k, v);
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// Which body key a document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Written text, stored under `"content"`
    #[default]
    Article,
    /// Video transcript, stored under `"script"`
    Video,
}

/// A text or transcript fragment with its quantized embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Fragment text
    #[serde(rename = "content")]
    pub text: String,
    /// Base64 of the bit-packed sign-quantized embedding
    pub embedding: String,
}

/// An image found in a document with its raw float32 embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFragment {
    pub image_url: String,
    #[serde(default)]
    pub image_alt: String,
    /// Base64 of the little-endian float32 embedding
    pub embedding: String,
}

/// Descriptive fields of a document plus one quantized summary vector.
///
/// Stored under the document's own id inside the metadata section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataRecord(OrderedMap<serde_json::Value>);

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a descriptive field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key, value.into());
        self
    }

    pub fn set_embedding(&mut self, embedding: String) {
        self.0.insert(EMBEDDING_KEY, serde_json::Value::String(embedding));
    }

    /// Base64 of the quantized record vector, if present.
    pub fn embedding(&self) -> Option<&str> {
        self.0.get(EMBEDDING_KEY).and_then(|v| v.as_str())
    }

    /// Descriptive fields, the embedding excluded.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.0.iter().filter(|(k, _)| *k != EMBEDDING_KEY)
    }

    fn field_lines(&self) -> impl Iterator<Item = String> + '_ {
        self.fields().map(|(k, v)| match v {
            serde_json::Value::String(s) => format!("{k}: {s}"),
            other => format!("{k}: {other}"),
        })
    }

    /// Renders newline-terminated `key: value` lines. This is the text that
    /// gets embedded for the metadata space.
    pub fn render_lines(&self) -> String {
        self.field_lines().map(|line| line + "\n").collect()
    }

    /// `key: value` lines joined by newlines, as shown to the generator for a
    /// metadata hit.
    pub fn summary(&self) -> String {
        self.field_lines().collect::<Vec<_>>().join("\n")
    }
}

/// A value in the metadata section: a plain descriptive string (url, author,
/// page id) or the document's metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataEntry {
    Text(String),
    Record(MetadataRecord),
    Other(serde_json::Value),
}

/// Fragments of a document, tagged by media kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentBody {
    /// Article text fragments (`"content"`)
    TextFragments(OrderedMap<Fragment>),
    /// Video transcript fragments (`"script"`)
    TranscriptFragments(OrderedMap<Fragment>),
}

impl DocumentBody {
    /// Empty body for a media kind.
    pub fn empty(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Article => Self::TextFragments(OrderedMap::new()),
            MediaKind::Video => Self::TranscriptFragments(OrderedMap::new()),
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        match self {
            Self::TextFragments(_) => MediaKind::Article,
            Self::TranscriptFragments(_) => MediaKind::Video,
        }
    }

    pub fn fragments(&self) -> &OrderedMap<Fragment> {
        match self {
            Self::TextFragments(f) | Self::TranscriptFragments(f) => f,
        }
    }

    fn fragments_mut(&mut self) -> &mut OrderedMap<Fragment> {
        match self {
            Self::TextFragments(f) | Self::TranscriptFragments(f) => f,
        }
    }
}

/// A persisted document. Created once, immutable afterwards.
///
/// [`RawDocument`](crate::collaborators::RawDocument) is the same shape, so
/// converter and crawler output is stored as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DocumentFile", into = "DocumentFile")]
pub struct StoredDocument {
    pub id: String,
    pub metadata: OrderedMap<MetadataEntry>,
    pub body: DocumentBody,
    pub images: OrderedMap<ImageFragment>,
}

impl StoredDocument {
    /// Empty document of the given kind.
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            metadata: OrderedMap::new(),
            body: DocumentBody::empty(kind),
            images: OrderedMap::new(),
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        self.body.media_kind()
    }

    pub fn fragments(&self) -> &OrderedMap<Fragment> {
        self.body.fragments()
    }

    /// Appends a fragment under the next text ordinal and returns its id.
    pub fn push_fragment(&mut self, text: impl Into<String>, embedding: String) -> String {
        let fragments = self.body.fragments_mut();
        let id = make_text_id(&self.id, fragments.len() + 1);
        fragments.insert(
            id.clone(),
            Fragment {
                text: text.into(),
                embedding,
            },
        );
        id
    }

    /// Appends an image under the next image ordinal and returns its id.
    pub fn push_image(
        &mut self,
        image_url: impl Into<String>,
        image_alt: impl Into<String>,
        embedding: String,
    ) -> String {
        let id = make_image_id(&self.id, self.images.len() + 1);
        self.images.insert(
            id.clone(),
            ImageFragment {
                image_url: image_url.into(),
                image_alt: image_alt.into(),
                embedding,
            },
        );
        id
    }

    /// Sets a plain descriptive metadata field (url, author, ...).
    pub fn set_metadata_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key, MetadataEntry::Text(value.into()));
    }

    /// Stores the metadata record under the document's own id.
    pub fn set_metadata_record(&mut self, record: MetadataRecord) {
        self.metadata
            .insert(self.id.clone(), MetadataEntry::Record(record));
    }

    /// The metadata record keyed by this document's id, if any.
    pub fn metadata_record(&self) -> Option<&MetadataRecord> {
        match self.metadata.get(&self.id)? {
            MetadataEntry::Record(record) => Some(record),
            _ => None,
        }
    }

    /// All fragment texts in insertion order, each newline-terminated.
    pub fn full_text(&self) -> String {
        self.fragments()
            .values()
            .map(|f| format!("{}\n", f.text))
            .collect()
    }
}

/// On-disk shape of a document.
#[derive(Serialize, Deserialize)]
struct DocumentFile {
    id: String,
    #[serde(default)]
    metadata: OrderedMap<MetadataEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<OrderedMap<Fragment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    script: Option<OrderedMap<Fragment>>,
    #[serde(default)]
    images: OrderedMap<ImageFragment>,
}

impl TryFrom<DocumentFile> for StoredDocument {
    type Error = String;

    fn try_from(file: DocumentFile) -> Result<Self, Self::Error> {
        let body = match (file.content, file.script) {
            (Some(_), Some(_)) => {
                return Err(format!(
                    "document {} has both \"content\" and \"script\"",
                    file.id
                ))
            }
            (Some(content), None) => DocumentBody::TextFragments(content),
            (None, Some(script)) => DocumentBody::TranscriptFragments(script),
            (None, None) => DocumentBody::empty(MediaKind::Article),
        };
        Ok(Self {
            id: file.id,
            metadata: file.metadata,
            body,
            images: file.images,
        })
    }
}

impl From<StoredDocument> for DocumentFile {
    fn from(doc: StoredDocument) -> Self {
        let (content, script) = match doc.body {
            DocumentBody::TextFragments(f) => (Some(f), None),
            DocumentBody::TranscriptFragments(f) => (None, Some(f)),
        };
        Self {
            id: doc.id,
            metadata: doc.metadata,
            content,
            script,
            images: doc.images,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_JSON: &str = r#"{
        "id": "vid1",
        "metadata": {
            "url": "https://example.com/watch",
            "vid1": { "title": "Launch", "duration": 92, "embedding": "AQ==" }
        },
        "script": {
            "vid1_text_1": { "content": "hello", "embedding": "gA==" },
            "vid1_text_2": { "content": "world", "embedding": "AA==" }
        }
    }"#;

    #[test]
    fn test_ordered_map_keeps_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert("zeta", 1);
        map.insert("alpha", 2);
        map.insert("mid", 3);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);

        assert_eq!(map.insert("alpha", 20), Some(2));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(map.get("alpha"), Some(&20));
    }

    #[test]
    fn test_ordered_map_json_order_survives() {
        let json = r#"{"b":1,"a":2,"c":3}"#;
        let map: OrderedMap<u32> = serde_json::from_str(json).unwrap();
        assert_eq!(serde_json::to_string(&map).unwrap(), json);
    }

    #[test]
    fn test_video_document_uses_script() {
        let doc: StoredDocument = serde_json::from_str(VIDEO_JSON).unwrap();
        assert_eq!(doc.media_kind(), MediaKind::Video);
        assert_eq!(doc.fragments().len(), 2);

        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("script").is_some());
        assert!(value.get("content").is_none());
    }

    #[test]
    fn test_metadata_record_lookup() {
        let doc: StoredDocument = serde_json::from_str(VIDEO_JSON).unwrap();
        let record = doc.metadata_record().unwrap();
        assert_eq!(record.embedding(), Some("AQ=="));
        assert_eq!(record.render_lines(), "title: Launch\nduration: 92\n");
        assert_eq!(record.summary(), "title: Launch\nduration: 92");
        assert!(matches!(
            doc.metadata.get("url"),
            Some(MetadataEntry::Text(_))
        ));
    }

    #[test]
    fn test_push_assigns_ordinals() {
        let mut doc = StoredDocument::new("doc1", MediaKind::Article);
        assert_eq!(doc.push_fragment("a", String::new()), "doc1_text_1");
        assert_eq!(doc.push_fragment("b", String::new()), "doc1_text_2");
        assert_eq!(doc.push_image("u", "alt", String::new()), "doc1_image_1");
        assert_eq!(doc.full_text(), "a\nb\n");
    }

    #[test]
    fn test_rejects_content_and_script() {
        let json = r#"{"id":"x","content":{},"script":{}}"#;
        assert!(serde_json::from_str::<StoredDocument>(json).is_err());
    }

    #[test]
    fn test_missing_body_is_empty_article() {
        let doc: StoredDocument = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert_eq!(doc.media_kind(), MediaKind::Article);
        assert!(doc.fragments().is_empty());
        assert!(doc.metadata_record().is_none());
    }
}
