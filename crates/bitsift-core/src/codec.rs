//! Quantization codec for embedding vectors.
//!
//! Two encodings are supported:
//!
//! - **Sign quantization** (text and metadata spaces): each dimension keeps a
//!   single bit, `1` iff the component is strictly positive. Bits are packed
//!   MSB-first, left zero-padded to a byte boundary. Lossy.
//! - **Raw float32** (image space): little-endian IEEE-754, 4 bytes per
//!   dimension, no packing. Lossless.
//!
//! Both are wrapped in standard base64 for storage in JSON documents.
//!
//! The packed form does not record its unpadded bit length. Callers that need
//! the logical dimension carry it next to the bytes in a [`BitVector`].

use crate::error::CodecError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Sign-quantized vector in packed form plus its logical bit length.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitVector {
    bytes: Vec<u8>,
    bits: usize,
}

impl BitVector {
    /// Wraps already packed bytes.
    ///
    /// `bits` is the logical dimension. It must fit in the bytes and the
    /// padding must not exceed one byte.
    pub fn from_packed(bytes: Vec<u8>, bits: usize) -> Result<Self, CodecError> {
        if packed_len(bits) != bytes.len() {
            return Err(CodecError::InvalidInput(format!(
                "{} packed bytes cannot hold exactly {} bits",
                bytes.len(),
                bits
            )));
        }
        Ok(Self { bytes, bits })
    }

    /// Wraps packed bytes assuming no padding (dimension = 8 * bytes).
    pub fn from_packed_unpadded(bytes: Vec<u8>) -> Self {
        let bits = bytes.len() * 8;
        Self { bytes, bits }
    }

    /// Packed bytes, MSB-first.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Logical number of bits (embedding dimension).
    pub fn bit_len(&self) -> usize {
        self.bits
    }

    /// Number of differing bits between two vectors of the same length.
    ///
    /// Equal to the Manhattan distance over 0/1 components. Padding bits are
    /// always zero on both sides so they never contribute.
    pub fn hamming(&self, other: &BitVector) -> u32 {
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Unpacked 0/1 view, padding stripped.
    pub fn to_bits(&self) -> Vec<u8> {
        let unpacked = unpack_bits(&self.bytes);
        let pad = unpacked.len() - self.bits;
        unpacked[pad..].to_vec()
    }
}

/// Number of bytes needed to pack `bits` bits.
pub fn packed_len(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Sign-quantizes an embedding: `1` iff `vector[i] > 0`, else `0`.
///
/// # Errors
///
/// `InvalidInput` for an empty vector or any non-finite component.
pub fn encode_binary(vector: &[f32]) -> Result<Vec<u8>, CodecError> {
    if vector.is_empty() {
        return Err(CodecError::InvalidInput("empty vector".to_string()));
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(CodecError::InvalidInput(format!(
            "non-finite component at index {}",
            pos
        )));
    }
    Ok(vector.iter().map(|&v| u8::from(v > 0.0)).collect())
}

/// Packs 0/1 values into bytes, MSB-first, left zero-padded to a multiple of 8.
///
/// # Errors
///
/// `InvalidInput` if any element is neither 0 nor 1.
pub fn pack_bits(bits: &[u8]) -> Result<Vec<u8>, CodecError> {
    if let Some(pos) = bits.iter().position(|&b| b > 1) {
        return Err(CodecError::InvalidInput(format!(
            "bit array contains {} at index {}",
            bits[pos], pos
        )));
    }

    let pad = (8 - bits.len() % 8) % 8;
    let mut packed = Vec::with_capacity(packed_len(bits.len()));
    let mut current = 0u8;
    let mut filled = pad;

    for &bit in bits {
        current = (current << 1) | bit;
        filled += 1;
        if filled == 8 {
            packed.push(current);
            current = 0;
            filled = 0;
        }
    }

    Ok(packed)
}

/// Unpacks bytes into 0/1 values, MSB-first. Yields `8 * bytes.len()` bits.
pub fn unpack_bits(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .flat_map(|&byte| (0..8).rev().map(move |shift| (byte >> shift) & 1))
        .collect()
}

/// Quantizes and packs an embedding in one step.
pub fn quantize(vector: &[f32]) -> Result<BitVector, CodecError> {
    let bits = encode_binary(vector)?;
    let bytes = pack_bits(&bits)?;
    Ok(BitVector {
        bytes,
        bits: vector.len(),
    })
}

/// Packs 0/1 values and encodes them as base64.
pub fn encode_base64(bits: &[u8]) -> Result<String, CodecError> {
    Ok(BASE64.encode(pack_bits(bits)?))
}

/// Decodes base64 text into 0/1 values (including any left padding).
pub fn decode_base64(text: &str) -> Result<Vec<u8>, CodecError> {
    Ok(unpack_bits(&decode_bytes(text)?))
}

/// Encodes an already packed [`BitVector`] for transport.
pub fn bit_vector_to_base64(vector: &BitVector) -> String {
    BASE64.encode(vector.as_bytes())
}

/// Decodes transport text into a [`BitVector`] of the given dimension.
pub fn bit_vector_from_base64(text: &str, bits: usize) -> Result<BitVector, CodecError> {
    BitVector::from_packed(decode_bytes(text)?, bits)
}

/// Serializes floats as little-endian IEEE-754, 4 bytes each.
///
/// # Errors
///
/// `InvalidInput` for an empty vector.
pub fn encode_float32_vector(vector: &[f32]) -> Result<Vec<u8>, CodecError> {
    if vector.is_empty() {
        return Err(CodecError::InvalidInput("empty vector".to_string()));
    }
    Ok(vector.iter().flat_map(|v| v.to_le_bytes()).collect())
}

/// Inverse of [`encode_float32_vector`], bit-for-bit.
///
/// # Errors
///
/// `InvalidInput` if the byte length is not a multiple of 4.
pub fn decode_float32_vector(bytes: &[u8]) -> Result<Vec<f32>, CodecError> {
    if bytes.len() % 4 != 0 {
        return Err(CodecError::InvalidInput(format!(
            "{} bytes is not a whole number of float32 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Raw float32 serialization wrapped in base64.
pub fn encode_float32_base64(vector: &[f32]) -> Result<String, CodecError> {
    Ok(BASE64.encode(encode_float32_vector(vector)?))
}

/// Decodes a base64 float32 payload.
pub fn decode_float32_base64(text: &str) -> Result<Vec<f32>, CodecError> {
    decode_float32_vector(&decode_bytes(text)?)
}

fn decode_bytes(text: &str) -> Result<Vec<u8>, CodecError> {
    BASE64
        .decode(text.trim())
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))
}
