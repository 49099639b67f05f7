//! Semantic text chunking for document processing.
//!
//! Documents are split into fragments before embedding and quantization.
//! Boundaries fall where the embedding of one paragraph window differs most
//! from the next, so each fragment stays on one topic.
//!
//! # Why Chunk Before Embedding?
//!
//! 1. **Coherence**: a fragment covers one subject, not a whole article
//! 2. **Quality**: sign quantization keeps more signal on focused passages
//! 3. **User experience**: search results show readable passages

mod semantic;
mod types;

pub use semantic::{assemble_chunks, breakpoints, build_windows, window_distances, SemanticChunker};
pub use types::TextChunk;

/// Splits text into paragraph units at line boundaries.
///
/// Each unit keeps its trailing newline, so concatenating every unit
/// reproduces the input exactly. Blank lines are units of their own.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Percentile with linear interpolation between the closest ranks.
///
/// `p` is in `[0, 100]`. Returns `0.0` for an empty slice.
pub fn percentile(values: &[f32], p: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let value = sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64);

    value as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_paragraphs_roundtrip() {
        let text = "first line\n\nsecond line\nthird";
        let units = split_paragraphs(text);
        assert_eq!(units, vec!["first line\n", "\n", "second line\n", "third"]);
        assert_eq!(units.concat(), text);
    }

    #[test]
    fn test_split_paragraphs_trailing_newline() {
        assert_eq!(split_paragraphs("a\nb\n"), vec!["a\n", "b\n"]);
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 4.0);
        assert_eq!(percentile(&values, 50.0), 2.5);
        assert_eq!(percentile(&values, 75.0), 3.25);
    }

    #[test]
    fn test_percentile_unsorted_input() {
        assert_eq!(percentile(&[4.0, 1.0, 3.0, 2.0], 50.0), 2.5);
    }

    #[test]
    fn test_percentile_single_value() {
        assert_eq!(percentile(&[0.42], 75.0), 0.42);
    }

    #[test]
    fn test_percentile_empty() {
        assert_eq!(percentile(&[], 75.0), 0.0);
    }
}
