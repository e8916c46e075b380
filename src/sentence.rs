//! Sentence boundary detection shared by normalization and extractive summaries.
//!
//! A boundary follows a run of terminators (plus any closing quotes or brackets).
//! Full-width terminators always end a sentence; ASCII terminators only when
//! followed by whitespace or end of text, so `3.14` and `e.g.x` stay intact.

const CJK_TERMINATORS: &[char] = &['。', '！', '？', '｡'];
const ASCII_TERMINATORS: &[char] = &['.', '!', '?', '…'];
const CLOSERS: &[char] = &['」', '』', '）', '】', ')', '"', '\'', '”', '’'];

fn is_terminator(c: char) -> bool {
    CJK_TERMINATORS.contains(&c) || ASCII_TERMINATORS.contains(&c)
}

/// Split text into sentence spans. Each span keeps its trailing whitespace,
/// so concatenating the spans reproduces the input exactly.
pub fn split_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut start = 0;

    while let Some((_, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }

        let mut full_width = CJK_TERMINATORS.contains(&c);
        while let Some(&(_, next)) = chars.peek() {
            if is_terminator(next) {
                full_width |= CJK_TERMINATORS.contains(&next);
                chars.next();
            } else if CLOSERS.contains(&next) {
                chars.next();
            } else {
                break;
            }
        }

        let at_break = match chars.peek() {
            None => true,
            Some(&(_, next)) => full_width || next.is_whitespace(),
        };
        if !at_break {
            continue;
        }

        while let Some(&(_, next)) = chars.peek() {
            if next.is_whitespace() {
                chars.next();
            } else {
                break;
            }
        }

        let end = chars.peek().map(|&(i, _)| i).unwrap_or(text.len());
        spans.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        spans.push(&text[start..]);
    }
    spans
}

/// Trimmed, whitespace-collapsed sentences; empty spans are dropped
pub fn sentences(text: &str) -> Vec<String> {
    split_spans(text)
        .into_iter()
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Whether a sentence ends in a full-width terminator run and needs no space after it
fn ends_full_width(sentence: &str) -> bool {
    sentence
        .trim_end_matches(CLOSERS)
        .chars()
        .rev()
        .take_while(|&c| is_terminator(c))
        .any(|c| CJK_TERMINATORS.contains(&c))
}

/// Join sentences so that `sentences(&join(xs)) == xs` for output of `sentences`
pub fn join(sentences: &[String]) -> String {
    let mut out = String::new();
    for (i, s) in sentences.iter().enumerate() {
        if i > 0 && !ends_full_width(&sentences[i - 1]) {
            out.push(' ');
        }
        out.push_str(s);
    }
    out
}

/// Character length of `join(sentences)`, without building it
pub fn joined_len(sentences: &[String]) -> usize {
    sentences
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let sep = usize::from(i > 0 && !ends_full_width(&sentences[i - 1]));
            sep + s.chars().count()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_reconstruct_input() {
        let text = "Hello there. How are you?  Fine!\nこんにちは。元気です。 ok";
        assert_eq!(split_spans(text).concat(), text);
    }

    #[test]
    fn test_ascii_needs_whitespace() {
        assert_eq!(sentences("Pi is 3.14 roughly. Yes."), vec!["Pi is 3.14 roughly.", "Yes."]);
        assert_eq!(sentences("e.g.x works"), vec!["e.g.x works"]);
    }

    #[test]
    fn test_full_width_splits_without_space() {
        assert_eq!(
            sentences("今日は晴れです。明日は雨です！本当？"),
            vec!["今日は晴れです。", "明日は雨です！", "本当？"]
        );
    }

    #[test]
    fn test_closers_stay_with_sentence() {
        assert_eq!(
            sentences("He said \"stop.\" Then he left."),
            vec!["He said \"stop.\"", "Then he left."]
        );
        assert_eq!(sentences("「はい。」次へ。"), vec!["「はい。」", "次へ。"]);
    }

    #[test]
    fn test_ellipsis_run() {
        assert_eq!(sentences("Wait... what?! Ok"), vec!["Wait...", "what?!", "Ok"]);
    }

    #[test]
    fn test_join_round_trips() {
        let inputs = [
            "One. Two! Three?",
            "今日は。明日は。",
            "Mixed end。Then English. 日本語。",
            "no terminator at all",
        ];
        for input in inputs {
            let s = sentences(input);
            let joined = join(&s);
            assert_eq!(sentences(&joined), s, "round trip failed for {input}");
            assert_eq!(joined_len(&s), joined.chars().count());
        }
    }

    #[test]
    fn test_collapses_internal_whitespace() {
        assert_eq!(sentences("a   b\n c. d"), vec!["a b c.", "d"]);
    }

    #[test]
    fn test_empty() {
        assert!(sentences("").is_empty());
        assert!(sentences("   \n ").is_empty());
    }
}
