use log::warn;
use serde::Serialize;

/// A line-aligned slice of normalized text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    /// Set when a single line exceeds the budget on its own
    pub oversized: bool,
}

/// Split `text` into chunks of at most `max_chars` characters, breaking only between lines.
///
/// Joining the chunk texts with `\n` reproduces `text` exactly. A line longer than
/// the budget becomes its own chunk, flagged `oversized`, and is never truncated.
pub fn chunk(text: &str, max_chars: usize) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);

    if text.chars().count() <= max_chars {
        return vec![Chunk {
            index: 0,
            text: text.to_string(),
            oversized: false,
        }];
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut open = false;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if line_len > max_chars {
            if open {
                close(&mut current, false, &mut chunks);
                open = false;
            }
            warn!(
                "Line of {line_len} chars exceeds chunk budget of {max_chars}; emitting oversized chunk {}",
                chunks.len()
            );
            current.push_str(line);
            close(&mut current, true, &mut chunks);
            current_len = 0;
            continue;
        }

        if open && current_len + 1 + line_len <= max_chars {
            current.push('\n');
            current.push_str(line);
            current_len += 1 + line_len;
            continue;
        }

        if open {
            close(&mut current, false, &mut chunks);
        }
        current.push_str(line);
        current_len = line_len;
        open = true;
    }

    if open {
        close(&mut current, false, &mut chunks);
    }
    chunks
}

fn close(current: &mut String, oversized: bool, chunks: &mut Vec<Chunk>) {
    chunks.push(Chunk {
        index: chunks.len(),
        text: std::mem::take(current),
        oversized,
    });
}

/// Reassemble chunk texts into the original text
pub fn join(chunks: &[Chunk]) -> String {
    chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk("hello\nworld", 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello\nworld");
        assert!(!chunks[0].oversized);
    }

    #[test]
    fn test_exact_budget_single_chunk() {
        assert_eq!(chunk("abcde", 5).len(), 1);
    }

    #[test]
    fn test_greedy_line_packing() {
        let text = "aaaa\nbbbb\ncccc\ndddd";
        let chunks = chunk(text, 9);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa\nbbbb", "cccc\ndddd"]);
        assert_eq!(chunks[1].index, 1);
        assert_eq!(join(&chunks), text);
    }

    #[test]
    fn test_oversized_line_is_own_chunk() {
        let text = "short\nthis line is far too long\nend";
        let chunks = chunk(text, 10);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["short", "this line is far too long", "end"]);
        assert_eq!(
            chunks.iter().map(|c| c.oversized).collect::<Vec<_>>(),
            vec![false, true, false]
        );
        assert_eq!(join(&chunks), text);
    }

    #[test]
    fn test_blank_lines_preserved() {
        let text = "para one.\n\npara two.\n\npara three.";
        let chunks = chunk(text, 12);
        assert_eq!(join(&chunks), text);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 12));
    }

    #[test]
    fn test_join_and_bounds_hold_across_budgets() {
        let text = "日本語の文章です。\n\nこれは二番目の段落です。\n\nThird paragraph is English and a bit longer than the rest.\n\n終わり。";
        for max in [1, 5, 10, 20, 40, 80, 200] {
            let chunks = chunk(text, max);
            assert_eq!(join(&chunks), text, "join failed at {max}");
            for c in &chunks {
                assert!(c.oversized || c.text.chars().count() <= max, "chunk over budget at {max}");
                assert_eq!(c.oversized, c.text.chars().count() > max);
            }
            for (i, c) in chunks.iter().enumerate() {
                assert_eq!(c.index, i);
            }
        }
    }

    #[test]
    fn test_empty_text() {
        let chunks = chunk("", 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
    }
}
