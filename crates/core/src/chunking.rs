use crate::models::Chunk;

/// Split parsed document text into bounded, independently embeddable chunks.
///
/// Sentences are detected on the literal `". "` delimiter and packed
/// greedily: a chunk closes as soon as appending the next sentence would make
/// the buffer reach `size` characters. A single sentence longer than `size`
/// becomes one oversized chunk rather than being cut mid-sentence. The
/// `overlap` parameter is accepted for configuration parity but the packing
/// algorithm does not apply it.
///
/// Deterministic and O(n) in the input length. Empty input yields no chunks.
pub fn chunk_text(document_id: &str, text: &str, size: usize, _overlap: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut ordinal = 0u64;

    for unit in text.split(". ") {
        let unit = unit.trim();
        if unit.is_empty() {
            continue;
        }

        let mut sentence = unit.to_string();
        if !sentence.ends_with('.') {
            sentence.push('.');
        }

        if !buffer.is_empty() && buffer.len() + 1 + sentence.len() >= size {
            flush(&mut chunks, &mut buffer, &mut ordinal, document_id);
        }
        if !buffer.is_empty() {
            buffer.push(' ');
        }
        buffer.push_str(&sentence);
    }

    flush(&mut chunks, &mut buffer, &mut ordinal, document_id);
    chunks
}

fn flush(chunks: &mut Vec<Chunk>, buffer: &mut String, ordinal: &mut u64, document_id: &str) {
    let text = buffer.trim();
    if text.is_empty() {
        return;
    }
    chunks.push(Chunk {
        text: text.to_string(),
        ordinal: *ordinal,
        document_id: document_id.to_string(),
    });
    *ordinal += 1;
    buffer.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_is_deterministic() {
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let first = chunk_text("doc", text, 50, 10);
        let second = chunk_text("doc", text, 50, 10);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_text("doc", "", 512, 50).is_empty());
        assert!(chunk_text("doc", "   ", 512, 50).is_empty());
    }

    #[test]
    fn oversized_sentence_is_emitted_whole() {
        let sentence = "This single sentence is far longer than the configured chunk size limit.";
        let chunks = chunk_text("doc", sentence, 20, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, sentence);
    }

    #[test]
    fn policy_text_splits_into_two_sentence_chunks() {
        let chunks = chunk_text("http://x/policy.pdf", "Coverage includes X. Coverage excludes Y.", 40, 0);
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["Coverage includes X.", "Coverage excludes Y."]);
    }

    #[test]
    fn ordinals_are_contiguous_from_zero() {
        let text = "One short sentence. Another short sentence. Third short sentence. Fourth short sentence.";
        let chunks = chunk_text("doc", text, 30, 0);
        assert!(chunks.len() > 1);
        for (position, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, position as u64);
            assert_eq!(chunk.document_id, "doc");
        }
    }

    #[test]
    fn sentences_accumulate_until_the_size_boundary() {
        let text = "Aa bb cc. Dd ee ff. Gg hh ii.";
        let chunks = chunk_text("doc", text, 25, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Aa bb cc. Dd ee ff.");
        assert_eq!(chunks[1].text, "Gg hh ii.");
    }
}
