//! Vector spaces: one flat, exact nearest-neighbour index per modality.
//!
//! Three spaces exist, with fixed names:
//!
//! | Space            | Vectors              | Metric                          |
//! |------------------|----------------------|---------------------------------|
//! | `text_space`     | sign-quantized bits  | Manhattan (popcount of XOR)     |
//! | `metadata_space` | sign-quantized bits  | Manhattan (popcount of XOR)     |
//! | `image_space`    | raw float32          | Cosine distance (`1 - cos`)     |
//!
//! Every space implements [`VectorIndex`], so an approximate index can be
//! swapped in without touching retrieval.

mod flat;

pub use flat::FlatVectorSpace;

use crate::codec::{bit_vector_from_base64, decode_float32_base64, BitVector};
use crate::error::{ConfigError, SearchError};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The three fixed vector spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpaceKind {
    Text,
    Metadata,
    Image,
}

impl SpaceKind {
    /// All spaces, in cascade order.
    pub const ALL: [SpaceKind; 3] = [SpaceKind::Text, SpaceKind::Metadata, SpaceKind::Image];

    /// Canonical space name.
    pub fn name(self) -> &'static str {
        match self {
            SpaceKind::Text => "text_space",
            SpaceKind::Metadata => "metadata_space",
            SpaceKind::Image => "image_space",
        }
    }

    pub fn metric(self) -> Metric {
        match self {
            SpaceKind::Text | SpaceKind::Metadata => Metric::Manhattan,
            SpaceKind::Image => Metric::Cosine,
        }
    }

    pub fn dtype(self) -> Dtype {
        match self {
            SpaceKind::Text | SpaceKind::Metadata => Dtype::BitPacked,
            SpaceKind::Image => Dtype::Float32,
        }
    }
}

impl fmt::Display for SpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SpaceKind {
    type Err = ConfigError;

    /// Accepts canonical names and the short aliases `text`, `metadata`, `image`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text_space" | "text" => Ok(SpaceKind::Text),
            "metadata_space" | "metadata" => Ok(SpaceKind::Metadata),
            "image_space" | "image" => Ok(SpaceKind::Image),
            other => Err(ConfigError::UnknownSpace(other.to_string())),
        }
    }
}

/// Distance function of a space. Lower is closer for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Manhattan,
    Cosine,
}

/// Element type of the vectors stored in a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    BitPacked,
    Float32,
}

impl Dtype {
    pub fn name(self) -> &'static str {
        match self {
            Dtype::BitPacked => "bit-packed",
            Dtype::Float32 => "float32",
        }
    }
}

/// A point or query vector.
#[derive(Debug, Clone, PartialEq)]
pub enum Vector {
    Bits(BitVector),
    Float32(Vec<f32>),
}

impl Vector {
    pub fn dtype(&self) -> Dtype {
        match self {
            Vector::Bits(_) => Dtype::BitPacked,
            Vector::Float32(_) => Dtype::Float32,
        }
    }

    /// Logical dimension (bits or floats).
    pub fn dimension(&self) -> usize {
        match self {
            Vector::Bits(b) => b.bit_len(),
            Vector::Float32(v) => v.len(),
        }
    }

    /// Decodes a transport-encoded vector for `kind`'s dtype.
    pub fn decode(kind: SpaceKind, dimension: usize, text: &str) -> Result<Self, SearchError> {
        match kind.dtype() {
            Dtype::BitPacked => Ok(Vector::Bits(bit_vector_from_base64(text, dimension)?)),
            Dtype::Float32 => {
                let floats = decode_float32_base64(text)?;
                if floats.len() != dimension {
                    return Err(SearchError::DimensionMismatch {
                        expected: dimension,
                        actual: floats.len(),
                    });
                }
                Ok(Vector::Float32(floats))
            }
        }
    }
}

/// A search hit: point id and its distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPoint {
    pub id: String,
    /// Distance; lower is closer
    pub score: f32,
}

/// Nearest-neighbour index over one space.
///
/// Implementations must publish a point's id and vector together: a
/// concurrent search sees both or neither.
pub trait VectorIndex: Send + Sync {
    fn kind(&self) -> SpaceKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Configured vector dimension.
    fn dimension(&self) -> usize;

    /// Number of registered points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers one point. Registering an id again replaces its vector in
    /// place.
    ///
    /// # Errors
    ///
    /// `DtypeMismatch` or `DimensionMismatch` if the vector does not fit the
    /// space. The space is left unchanged.
    fn add_point(&self, id: String, vector: Vector) -> Result<(), SearchError>;

    /// Drops every point owned by `document_id`. Returns how many went.
    fn remove_document(&self, document_id: &str) -> usize;

    /// Returns up to `top_k` points in ascending distance order.
    fn search(&self, query: &Vector, top_k: usize) -> Result<Vec<ScoredPoint>, SearchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{bit_vector_to_base64, encode_float32_base64, quantize};

    #[test]
    fn test_space_names_and_aliases() {
        for kind in SpaceKind::ALL {
            assert_eq!(kind.name().parse::<SpaceKind>().unwrap(), kind);
        }
        assert_eq!("text".parse::<SpaceKind>().unwrap(), SpaceKind::Text);
        assert_eq!("image".parse::<SpaceKind>().unwrap(), SpaceKind::Image);
    }

    #[test]
    fn test_unknown_space_name() {
        assert_eq!(
            "audio_space".parse::<SpaceKind>(),
            Err(ConfigError::UnknownSpace("audio_space".into()))
        );
    }

    #[test]
    fn test_metric_per_space() {
        assert_eq!(SpaceKind::Text.metric(), Metric::Manhattan);
        assert_eq!(SpaceKind::Metadata.metric(), Metric::Manhattan);
        assert_eq!(SpaceKind::Image.metric(), Metric::Cosine);
    }

    #[test]
    fn test_decode_bits() {
        let bits = quantize(&[1.0, -1.0, 2.0, 0.0, 3.0, 1.0, -2.0, 0.5]).unwrap();
        let text = bit_vector_to_base64(&bits);
        assert_eq!(
            Vector::decode(SpaceKind::Text, 8, &text).unwrap(),
            Vector::Bits(bits)
        );
        assert!(Vector::decode(SpaceKind::Text, 16, &text).is_err());
    }

    #[test]
    fn test_decode_float32_checks_dimension() {
        let text = encode_float32_base64(&[0.5, -0.25]).unwrap();
        assert_eq!(
            Vector::decode(SpaceKind::Image, 2, &text).unwrap(),
            Vector::Float32(vec![0.5, -0.25])
        );
        assert_eq!(
            Vector::decode(SpaceKind::Image, 3, &text),
            Err(SearchError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        );
    }
}
