//! Overlapping text segmentation with sentence-boundary snapping.
//!
//! The segmenter walks the input left to right in fixed-size character
//! windows. When a window does not reach the end of the text, it snaps the
//! cut to the sentence boundary closest to the window's right edge, provided
//! that boundary falls within the last 30% of the window. Output depends
//! only on the input text and the [`SegmenterConfig`].

use crate::config::SegmenterConfig;
use crate::types::RagError;

/// Splits `text` into overlapping chunks.
///
/// Chunks are trimmed of surrounding whitespace and empty chunks are
/// dropped. Empty input yields an empty vector; input shorter than
/// `chunk_size` yields exactly one chunk.
pub fn segment(text: &str, config: &SegmenterConfig) -> Result<Vec<String>, RagError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let mut end = (start + config.chunk_size).min(len);

        // Only snap when the window leaves text behind it.
        if end < len {
            let threshold = start as f64 + config.chunk_size as f64 * 0.7;
            if let Some(boundary) = last_boundary(&chars, start, end) {
                if boundary as f64 >= threshold {
                    end = boundary + 1;
                }
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if end >= len {
            break;
        }
        let next = end.saturating_sub(config.overlap);
        if next <= start {
            break;
        }
        start = next;
    }

    Ok(chunks)
}

/// Index of the sentence boundary closest to the window's right edge, if any.
///
/// Boundaries are `.`, `!`, `?`, or the first newline of a `\n\n` pair that
/// sits entirely inside the window.
fn last_boundary(chars: &[char], start: usize, end: usize) -> Option<usize> {
    let mut idx = end;
    while idx > start {
        idx -= 1;
        match chars[idx] {
            '.' | '!' | '?' => return Some(idx),
            '\n' if idx + 1 < end && chars[idx + 1] == '\n' => return Some(idx),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(chunk_size: usize, overlap: usize) -> SegmenterConfig {
        SegmenterConfig {
            chunk_size,
            overlap,
        }
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunks = segment("", &config(100, 20)).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn whitespace_only_text_yields_no_chunks() {
        let chunks = segment("   \n\t  ", &config(100, 20)).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_text_yields_single_trimmed_chunk() {
        let chunks = segment("  hello world  ", &config(100, 20)).unwrap();
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn overlap_at_or_above_chunk_size_is_rejected() {
        assert!(segment("abc", &config(10, 10)).is_err());
        assert!(segment("abc", &config(10, 12)).is_err());
    }

    #[test]
    fn snaps_to_sentence_boundary_in_last_thirty_percent() {
        // Period at index 84 sits past 0.7 * 100, so the first chunk ends
        // just after it instead of at the hard cutoff.
        let mut text = "a".repeat(84);
        text.push('.');
        text.push_str(&"b".repeat(120));
        let chunks = segment(&text, &config(100, 10)).unwrap();
        assert_eq!(chunks[0].len(), 85);
        assert!(chunks[0].ends_with('.'));
        // Next window starts at end - overlap = 85 - 10.
        assert!(chunks[1].starts_with('a'));
    }

    #[test]
    fn ignores_boundary_before_threshold() {
        // Only boundary is at index 30, well before 70% of the window.
        let mut text = "a".repeat(30);
        text.push('.');
        text.push_str(&"b".repeat(150));
        let chunks = segment(&text, &config(100, 10)).unwrap();
        assert_eq!(chunks[0].chars().count(), 100);
    }

    #[test]
    fn double_newline_acts_as_boundary() {
        let mut text = "a".repeat(80);
        text.push_str("\n\n");
        text.push_str(&"b".repeat(120));
        let chunks = segment(&text, &config(100, 10)).unwrap();
        // Cut lands after the first newline of the pair; trim removes it.
        assert_eq!(chunks[0], "a".repeat(80));
    }

    #[test]
    fn picks_boundary_nearest_to_window_edge() {
        // Both a '.' (at 75) and a '!' (at 90) pass the threshold; the
        // later one wins regardless of marker kind.
        let mut text = "a".repeat(75);
        text.push('.');
        text.push_str(&"b".repeat(14));
        text.push('!');
        text.push_str(&"c".repeat(120));
        let chunks = segment(&text, &config(100, 10)).unwrap();
        assert!(chunks[0].ends_with('!'));
        assert_eq!(chunks[0].chars().count(), 91);
    }

    #[test]
    fn long_uniform_text_yields_three_overlapping_chunks() {
        let text = "a".repeat(2500);
        let chunks = segment(&text, &config(1000, 200)).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[1], text[800..1800]);
        assert_eq!(chunks[2], text[1600..2500]);
    }

    #[test]
    fn multibyte_text_never_splits_scalar_values() {
        let text = "é".repeat(250);
        let chunks = segment(&text, &config(100, 20)).unwrap();
        assert_eq!(chunks[0].chars().count(), 100);
        for chunk in &chunks {
            assert!(chunk.chars().all(|c| c == 'é'));
        }
    }

    proptest! {
        /// Marker-free, whitespace-free text reconstructs exactly by
        /// dropping each successor chunk's leading overlap.
        #[test]
        fn overlap_reconstruction(
            text in "[a-z]{1,400}",
            chunk_size in 2usize..80,
            overlap in 0usize..40,
        ) {
            prop_assume!(overlap < chunk_size);
            let chunks = segment(&text, &config(chunk_size, overlap)).unwrap();
            prop_assert!(!chunks.is_empty());

            let mut rebuilt = chunks[0].clone();
            for chunk in &chunks[1..] {
                rebuilt.push_str(&chunk[overlap.min(chunk.len())..]);
            }
            prop_assert_eq!(rebuilt, text);
        }
    }
}
