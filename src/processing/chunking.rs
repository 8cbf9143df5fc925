//! Recursive character chunking with a fixed overlap.
//!
//! Passage boundaries prefer paragraph breaks, then line breaks, then sentence ends, then word
//! gaps; when none fits the window the text is cut at exactly `chunk_size` characters. Sizes are
//! counted in characters, never bytes, so multi-byte text is never split inside a code point.
//!
//! Every passage after the first begins `overlap` characters before the end of its predecessor.
//! Dropping those leading characters from each later passage and concatenating yields the input
//! text unchanged.

use super::types::{ChunkingError, Passage};

/// Boundary separators in order of preference.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split `text` into passages, collecting the lazy [`Passages`] iterator.
///
/// Returns an empty vector for empty input.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Passage>, ChunkingError> {
    Ok(split_passages(text, chunk_size, overlap)?.collect())
}

/// Validate parameters and return a lazy passage iterator over `text`.
pub fn split_passages(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Passages<'_>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkingError::InvalidOverlap {
            size: chunk_size,
            overlap,
        });
    }

    let mut offsets: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();
    offsets.push(text.len());

    Ok(Passages {
        text,
        offsets,
        chunk_size,
        overlap,
        next_start: Some(0),
        index: 0,
    })
}

/// Lazy, deterministic sequence of passages over a borrowed text.
pub struct Passages<'a> {
    text: &'a str,
    /// Byte offset of every character, plus `text.len()` as a sentinel.
    offsets: Vec<usize>,
    chunk_size: usize,
    overlap: usize,
    /// Character index of the next passage start, `None` once exhausted.
    next_start: Option<usize>,
    index: usize,
}

impl Passages<'_> {
    fn char_count(&self) -> usize {
        self.offsets.len() - 1
    }

    fn char_index_of(&self, byte_offset: usize) -> usize {
        self.offsets
            .binary_search(&byte_offset)
            .unwrap_or_else(|insertion| insertion)
    }

    /// Pick the end (character index) of the passage starting at `start`.
    fn find_end(&self, start: usize) -> usize {
        let window_end = start + self.chunk_size;
        // Ends must clear the overlap so the following passage starts strictly later.
        let min_end = start + self.overlap + 1;
        let window = &self.text[self.offsets[start]..self.offsets[window_end]];

        for separator in SEPARATORS {
            if let Some(position) = window.rfind(separator) {
                let boundary = self.char_index_of(self.offsets[start] + position + separator.len());
                if boundary >= min_end {
                    return boundary;
                }
            }
        }
        window_end
    }
}

impl Iterator for Passages<'_> {
    type Item = Passage;

    fn next(&mut self) -> Option<Passage> {
        let start = self.next_start?;
        let total = self.char_count();
        if total == 0 {
            self.next_start = None;
            return None;
        }

        let end = if total - start <= self.chunk_size {
            self.next_start = None;
            total
        } else {
            let end = self.find_end(start);
            self.next_start = Some(end - self.overlap);
            end
        };

        let (start_byte, end_byte) = (self.offsets[start], self.offsets[end]);
        let passage = Passage {
            index: self.index,
            start: start_byte,
            end: end_byte,
            text: self.text[start_byte..end_byte].to_string(),
        };
        self.index += 1;
        Some(passage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(text: &str, passages: &[Passage]) -> String {
        let mut rebuilt = String::new();
        let mut covered = 0;
        for passage in passages {
            rebuilt.push_str(&text[covered..passage.end]);
            covered = passage.end;
        }
        rebuilt
    }

    fn overlap_chars(text: &str, previous: &Passage, next: &Passage) -> usize {
        text[next.start..previous.end].chars().count()
    }

    #[test]
    fn scenario_2500_chars_size_1000_overlap_200() {
        let text = "x".repeat(2500);
        let passages = chunk_text(&text, 1000, 200).expect("chunks");

        let lengths: Vec<usize> = passages.iter().map(|p| p.text.chars().count()).collect();
        assert_eq!(lengths, vec![1000, 1000, 900]);
        let ranges: Vec<(usize, usize)> = passages.iter().map(|p| (p.start, p.end)).collect();
        assert_eq!(ranges, vec![(0, 1000), (800, 1800), (1600, 2500)]);
        for pair in passages.windows(2) {
            assert_eq!(overlap_chars(&text, &pair[0], &pair[1]), 200);
        }
        // New characters contributed by each passage.
        assert_eq!(passages[2].end - passages[1].end, 700);
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let passages = chunk_text(&text, 100, 10).expect("chunks");

        assert_eq!(passages[0].text, format!("{}\n\n", "a".repeat(60)));
        assert!(passages[1].text.ends_with(&"b".repeat(60)));
        assert_eq!(reconstruct(&text, &passages), text);
    }

    #[test]
    fn falls_back_to_word_gaps_before_hard_cuts() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let passages = chunk_text(text, 16, 4).expect("chunks");

        for passage in &passages {
            assert!(passage.text.chars().count() <= 16, "{passage:?}");
        }
        assert!(passages[0].text.ends_with(' '));
        assert_eq!(reconstruct(text, &passages), text);
    }

    #[test]
    fn invariants_hold_for_mixed_text() {
        let text = "Rust is a systems language. It has ownership.\nBorrowing rules apply.\n\n\
                    Ferris the crab 🦀 is the mascot. Émigré naïve café text wraps around here. "
            .repeat(12);
        let (size, overlap) = (120, 30);
        let passages = chunk_text(&text, size, overlap).expect("chunks");

        assert!(passages.len() > 1);
        for (position, passage) in passages.iter().enumerate() {
            assert_eq!(passage.index, position);
            assert!(passage.text.chars().count() <= size);
            assert_eq!(&text[passage.start..passage.end], passage.text);
        }
        for pair in passages.windows(2) {
            assert_eq!(overlap_chars(&text, &pair[0], &pair[1]), overlap);
        }
        assert_eq!(passages.last().map(|p| p.end), Some(text.len()));
        assert_eq!(reconstruct(&text, &passages), text);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "One. Two. Three.\nFour five six seven.\n\nEight nine ten. ".repeat(40);
        let first = chunk_text(&text, 90, 15).expect("chunks");
        let second = chunk_text(&text, 90, 15).expect("chunks");
        assert_eq!(first, second);
    }

    #[test]
    fn short_text_yields_single_passage() {
        let passages = chunk_text("tiny", 1000, 200).expect("chunks");
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].text, "tiny");
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(chunk_text("", 10, 2).expect("chunks").is_empty());
    }

    #[test]
    fn zero_overlap_partitions_text() {
        let text = "abcdefghij";
        let passages = chunk_text(text, 4, 0).expect("chunks");
        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn iterator_is_lazy() {
        let text = "word ".repeat(1000);
        let mut passages = split_passages(&text, 50, 10).expect("iterator");
        let first = passages.next().expect("first passage");
        assert_eq!(first.index, 0);
        assert_eq!(passages.next().map(|p| p.index), Some(1));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert_eq!(
            chunk_text("text", 0, 0).unwrap_err(),
            ChunkingError::InvalidChunkSize
        );
        assert_eq!(
            chunk_text("text", 10, 10).unwrap_err(),
            ChunkingError::InvalidOverlap {
                size: 10,
                overlap: 10
            }
        );
    }
}
