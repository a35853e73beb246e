//! Token estimation and content chunking.
//!
//! Backends count tokens differently; a character-count heuristic is close
//! enough to decide whether content fits a model's context window and
//! where to split it when it does not. Splits prefer paragraph breaks,
//! then sentence breaks, then spaces.

/// Rough chars-per-token ratio for English-heavy source and prose.
const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a piece of text.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimate the combined token count of several message contents.
pub fn estimate_message_tokens<'a>(contents: impl Iterator<Item = &'a str>) -> usize {
    contents.map(estimate_tokens).sum()
}

/// Split `text` into chunks of at most `max_tokens` estimated tokens.
///
/// Boundaries are chosen in preference order: paragraph (`\n\n`),
/// sentence (`. `), space. A single unbroken run longer than the budget
/// is hard-split on a char boundary as a last resort.
pub fn split_for_context(text: &str, max_tokens: usize) -> Vec<String> {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN).max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in split_keeping(text, "\n\n") {
        if fits(&current, &paragraph, max_chars) {
            current.push_str(&paragraph);
            continue;
        }
        flush(&mut chunks, &mut current);

        if paragraph.chars().count() <= max_chars {
            current.push_str(&paragraph);
            continue;
        }

        // Paragraph alone is too large: fall back to sentences, then spaces.
        for sentence in split_keeping(&paragraph, ". ") {
            if fits(&current, &sentence, max_chars) {
                current.push_str(&sentence);
                continue;
            }
            flush(&mut chunks, &mut current);

            if sentence.chars().count() <= max_chars {
                current.push_str(&sentence);
                continue;
            }

            for word in split_keeping(&sentence, " ") {
                if !fits(&current, &word, max_chars) {
                    flush(&mut chunks, &mut current);
                }
                if word.chars().count() > max_chars {
                    hard_split(&word, max_chars, &mut chunks);
                } else {
                    current.push_str(&word);
                }
            }
        }
    }

    flush(&mut chunks, &mut current);
    chunks
}

/// Clamp text to the first chunk that fits `max_tokens`, noting truncation.
pub fn clamp_to_context(text: &str, max_tokens: usize) -> (String, bool) {
    let mut chunks = split_for_context(text, max_tokens);
    let truncated = chunks.len() > 1;
    (chunks.remove(0), truncated)
}

/// Split on a separator, keeping the separator attached to the preceding
/// piece so rejoining chunks loses nothing.
fn split_keeping(text: &str, sep: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(idx) = rest.find(sep) {
        let end = idx + sep.len();
        pieces.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

fn fits(current: &str, addition: &str, max_chars: usize) -> bool {
    current.chars().count() + addition.chars().count() <= max_chars
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
}

fn hard_split(word: &str, max_chars: usize, chunks: &mut Vec<String>) {
    let chars: Vec<char> = word.chars().collect();
    for piece in chars.chunks(max_chars) {
        chunks.push(piece.iter().collect());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("ab"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn small_text_is_one_chunk() {
        let chunks = split_for_context("hello world", 100);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn splits_on_paragraph_boundaries() {
        let a = "a".repeat(40);
        let b = "b".repeat(40);
        let text = format!("{a}\n\n{b}");

        // 15 tokens = 60 chars: each paragraph fits alone, not together.
        let chunks = split_for_context(&text, 15);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with('a'));
        assert!(chunks[1].starts_with('b'));
    }

    #[test]
    fn splits_on_sentences_when_paragraph_too_big() {
        let text = format!("{}. {}. ", "x".repeat(30), "y".repeat(30));
        let chunks = split_for_context(&text, 10); // 40 chars per chunk
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40);
        }
    }

    #[test]
    fn rejoined_chunks_preserve_content() {
        let text = "one two three four five six seven eight nine ten \
                    eleven twelve thirteen fourteen fifteen";
        let chunks = split_for_context(text, 5);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn unbroken_run_is_hard_split() {
        let text = "z".repeat(100);
        let chunks = split_for_context(&text, 5); // 20 chars per chunk
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn clamp_reports_truncation() {
        let (kept, truncated) = clamp_to_context("short", 100);
        assert_eq!(kept, "short");
        assert!(!truncated);

        let long = "word ".repeat(200);
        let (kept, truncated) = clamp_to_context(&long, 10);
        assert!(truncated);
        assert!(kept.chars().count() <= 40);
    }
}
