//! Caption text normalization.
//!
//! Raw caption text goes through an ordered list of named phases, each a pure
//! `&str -> String` transform that is a fixed point on its own output:
//!
//! 1. `cleanup` drops stage directions and music glyphs
//! 2. `fillers` removes verbal fillers at word boundaries, sentence by sentence
//! 3. `corrections` applies the spelling dictionary
//! 4. `transitions` starts a paragraph before sentence-initial discourse markers
//! 5. `paragraphs` regroups sentences into bounded paragraphs
//! 6. `whitespace` trims lines and collapses blank-line runs
//!
//! Phases 1-3 only look at whitespace as a boundary, never at its shape, and
//! phases 4-6 only rewrite whitespace, so a second pass over normalized text
//! changes nothing. `Normalizer::normalize` still reruns the list until the
//! output is stable.

use log::debug;
use regex::{Captures, NoExpand, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sentence;

/// Upper bound on whole-pipeline passes in `normalize`
const MAX_PASSES: usize = 4;
/// Upper bound on repeated application inside one phase
const MAX_PHASE_ROUNDS: usize = 8;

/// A dictionary entry for the correction phase
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Correction {
    pub from: String,
    pub to: String,
}

impl Correction {
    fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Vocabulary and layout settings for the normalizer
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizationRules {
    /// Parenthesised stage directions removed by cleanup, e.g. `(applause)`
    pub stage_directions: Vec<String>,
    pub fillers: Vec<String>,
    pub corrections: Vec<Correction>,
    /// Sentence-initial discourse markers that open a new paragraph
    pub transitions: Vec<String>,
    pub sentences_per_paragraph: usize,
    pub max_paragraph_chars: usize,
    pub max_blank_lines: usize,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for NormalizationRules {
    fn default() -> Self {
        Self {
            stage_directions: strings(&[
                "music", "applause", "laughter", "laughs", "cheering", "inaudible", "silence", "音楽", "拍手", "笑",
                "笑い", "歓声",
            ]),
            fillers: strings(&[
                "um", "umm", "uh", "uhh", "uhm", "erm", "er", "hmm", "you know", "i mean", "えーと", "えっと", "ええと",
                "えー", "あのー", "うーん", "まぁ",
            ]),
            corrections: vec![
                Correction::new("alot", "a lot"),
                Correction::new("could of", "could have"),
                Correction::new("should of", "should have"),
                Correction::new("would of", "would have"),
                Correction::new("gonna", "going to"),
                Correction::new("wanna", "want to"),
                Correction::new("gotta", "got to"),
                Correction::new("kinda", "kind of"),
                Correction::new("sorta", "sort of"),
                Correction::new("下さい", "ください"),
                Correction::new("出来る", "できる"),
                Correction::new("宜しく", "よろしく"),
                Correction::new("有難う", "ありがとう"),
                Correction::new("言う事", "いうこと"),
            ],
            transitions: strings(&[
                "however",
                "meanwhile",
                "on the other hand",
                "in addition",
                "furthermore",
                "moreover",
                "nevertheless",
                "in conclusion",
                "first of all",
                "finally",
                "next",
                "by the way",
                "anyway",
                "しかし",
                "ところで",
                "さて",
                "一方",
                "次に",
                "それでは",
                "まず",
                "最後に",
                "つまり",
                "ちなみに",
                "結論として",
            ]),
            sentences_per_paragraph: 4,
            max_paragraph_chars: 400,
            max_blank_lines: 1,
        }
    }
}

/// One named normalization step
pub struct Phase {
    pub name: &'static str,
    apply: fn(&Normalizer, &str) -> String,
}

impl Phase {
    pub fn apply(&self, normalizer: &Normalizer, text: &str) -> String {
        (self.apply)(normalizer, text)
    }
}

/// The ordered phase list
pub const PHASES: [Phase; 6] = [
    Phase {
        name: "cleanup",
        apply: Normalizer::cleanup,
    },
    Phase {
        name: "fillers",
        apply: Normalizer::remove_fillers,
    },
    Phase {
        name: "corrections",
        apply: Normalizer::correct,
    },
    Phase {
        name: "transitions",
        apply: Normalizer::break_at_transitions,
    },
    Phase {
        name: "paragraphs",
        apply: Normalizer::regroup_paragraphs,
    },
    Phase {
        name: "whitespace",
        apply: Normalizer::collapse_whitespace,
    },
];

/// Compiled normalization rules
pub struct Normalizer {
    rules: NormalizationRules,
    brackets: Regex,
    stage_directions: Option<Regex>,
    glyphs: Regex,
    fillers: Option<Regex>,
    hedges: Option<Regex>,
    tidy: Vec<(Regex, &'static str)>,
    corrections: Vec<(Regex, String)>,
    transitions: Option<Regex>,
    paragraph_break: Regex,
    horizontal_space: Regex,
    blank_run: Regex,
    blank_replacement: String,
}

/// Regex source for a literal phrase; inner whitespace matches any whitespace run
fn phrase_pattern(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

fn word_bounded(phrase: &str) -> String {
    let mut pattern = phrase_pattern(phrase);
    if phrase.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        pattern.insert_str(0, r"\b");
    }
    if phrase.ends_with(|c: char| c.is_ascii_alphanumeric()) {
        pattern.push_str(r"\b");
    }
    pattern
}

/// Alternation of phrases, longest first so `えーと` wins over `えー`
fn alternation(phrases: &[String], bound: fn(&str) -> String) -> Option<String> {
    let mut phrases: Vec<&str> = phrases.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
    if phrases.is_empty() {
        return None;
    }
    phrases.sort_by_key(|p| std::cmp::Reverse(p.chars().count()));
    Some(phrases.into_iter().map(bound).collect::<Vec<_>>().join("|"))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::InvalidConfig(format!("normalization rule: {e}")))
}

/// Apply `f` until the text stops changing
fn until_stable(text: &str, f: impl Fn(&str) -> String) -> String {
    let mut current = f(text);
    for _ in 1..MAX_PHASE_ROUNDS {
        let next = f(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

const COMMAS: [char; 3] = [',', '，', '、'];

/// Replacement for one filler match.
///
/// `a, um, b` closes up to `a b`; otherwise the left boundary stays and the right one
/// survives only when it ends the clause.
fn drop_filler(caps: &Captures) -> String {
    let left = &caps["l"];
    let right = &caps["r"];
    if left.contains(COMMAS) && right.starts_with(COMMAS) {
        let left = left.trim_start_matches(COMMAS);
        return if left.is_empty() {
            right.trim_start_matches(COMMAS).to_string()
        } else {
            left.to_string()
        };
    }
    let keep_right = right.starts_with(|c: char| !c.is_whitespace() && !COMMAS.contains(&c));
    format!("{left}{}", if keep_right { right } else { "" })
}

impl Normalizer {
    pub fn new(rules: NormalizationRules) -> Result<Self> {
        if rules.sentences_per_paragraph == 0 || rules.max_paragraph_chars == 0 {
            return Err(Error::InvalidConfig(
                "sentences_per_paragraph and max_paragraph_chars must be positive".to_string(),
            ));
        }
        if rules.max_blank_lines == 0 {
            return Err(Error::InvalidConfig("max_blank_lines must be at least 1".to_string()));
        }

        let stage_directions = alternation(&rules.stage_directions, phrase_pattern)
            .map(|alts| compile(&format!(r"[(（]\s*(?i:{alts})\s*[)）]")))
            .transpose()?;

        // Single-word fillers go wherever they stand alone. Multi-word hedges like "you know"
        // double as real clauses, so they only go when set off by punctuation on both sides.
        let (hedges, words): (Vec<String>, Vec<String>) =
            rules.fillers.iter().cloned().partition(|f| f.trim().contains(char::is_whitespace));

        // Left boundary is captured and re-emitted; the right boundary decides what survives
        let fillers = alternation(&words, phrase_pattern)
            .map(|alts| {
                compile(&format!(
                    r"(?P<l>^|[,，、]\s*|[\s.!?;:。．！？…])(?i:{alts})(?P<r>[,，、]+\s*|\s+|[.!?;:。．！？…]|$)"
                ))
            })
            .transpose()?;
        let hedges = alternation(&hedges, phrase_pattern)
            .map(|alts| {
                compile(&format!(
                    r"(?P<l>^\s*|[,，、]\s*)(?i:{alts})(?P<r>[,，、]+\s*|[.!?;:。．！？…]|$)"
                ))
            })
            .transpose()?;

        let mut corrections = Vec::new();
        for c in &rules.corrections {
            if c.from.trim().is_empty() {
                return Err(Error::InvalidConfig("correction with empty source".to_string()));
            }
            if c.to.contains(c.from.trim()) {
                return Err(Error::InvalidConfig(format!(
                    "correction '{}' -> '{}' would never settle",
                    c.from, c.to
                )));
            }
            corrections.push((compile(&word_bounded(c.from.trim()))?, c.to.clone()));
        }

        let transitions = alternation(&rules.transitions, word_bounded)
            .map(|alts| compile(&format!(r"^(?i:{alts})")))
            .transpose()?;

        let tidy = vec![
            (compile(r"[^\S\n]+([,.!?;:])")?, "$1"),
            (compile(r"[,，、]+\s*([.!?;:。．！？…])")?, "$1"),
            (compile(r"([,，、])\s*[,，、]+")?, "$1"),
            (compile(r"^[\s,，、]+")?, ""),
        ];

        let max_newlines = rules.max_blank_lines + 1;
        Ok(Self {
            brackets: compile(r"\[[^\[\]]*\]|［[^［］]*］")?,
            stage_directions,
            glyphs: compile(r"[♪♫♬♩]+")?,
            fillers,
            hedges,
            tidy,
            corrections,
            transitions,
            paragraph_break: compile(r"\n\s*\n")?,
            horizontal_space: compile(r"[^\S\n]+")?,
            blank_run: compile(&format!(r"\n{{{},}}", max_newlines + 1))?,
            blank_replacement: "\n".repeat(max_newlines),
            rules,
        })
    }

    /// Run all phases until the output is stable
    pub fn normalize(&self, text: &str) -> String {
        let mut current = self.run_phases(text);
        for pass in 1..MAX_PASSES {
            let next = self.run_phases(&current);
            if next == current {
                break;
            }
            debug!("Normalization pass {} changed the text, rerunning", pass + 1);
            current = next;
        }
        current
    }

    fn run_phases(&self, text: &str) -> String {
        PHASES
            .iter()
            .fold(text.to_string(), |acc, phase| phase.apply(self, &acc))
    }

    /// Phase 1: strip `[Music]`, `(applause)`, `♪` and friends
    pub fn cleanup(&self, text: &str) -> String {
        until_stable(text, |t| {
            let t = self.brackets.replace_all(t, " ");
            let t = self.glyphs.replace_all(&t, " ");
            match &self.stage_directions {
                Some(re) => re.replace_all(&t, " ").into_owned(),
                None => t.into_owned(),
            }
        })
    }

    /// Phase 2: remove fillers only where they stand alone as a word.
    ///
    /// Works sentence by sentence; a sentence made only of fillers is left as it was.
    pub fn remove_fillers(&self, text: &str) -> String {
        let patterns: Vec<&Regex> = self.fillers.iter().chain(&self.hedges).collect();
        if patterns.is_empty() {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len());
        for span in sentence::split_spans(text) {
            let body = span.trim_end();
            let trailing = &span[body.len()..];

            let cleaned = until_stable(body, |s| {
                let removed = patterns
                    .iter()
                    .fold(s.to_string(), |acc, re| re.replace_all(&acc, drop_filler).into_owned());
                if removed == s {
                    return removed;
                }
                self.tidy
                    .iter()
                    .fold(removed, |acc, (re, rep)| re.replace_all(&acc, *rep).into_owned())
            });

            if cleaned.chars().any(char::is_alphanumeric) {
                out.push_str(cleaned.trim_end());
            } else {
                out.push_str(body);
            }
            out.push_str(trailing);
        }
        out
    }

    /// Phase 3: dictionary corrections
    pub fn correct(&self, text: &str) -> String {
        until_stable(text, |t| {
            self.corrections
                .iter()
                .fold(t.to_string(), |acc, (re, to)| re.replace_all(&acc, NoExpand(to)).into_owned())
        })
    }

    /// Phase 4: blank line before each sentence that opens with a discourse marker
    pub fn break_at_transitions(&self, text: &str) -> String {
        let Some(transitions) = &self.transitions else {
            return text.to_string();
        };

        let mut out = String::with_capacity(text.len() + 16);
        for (i, span) in sentence::split_spans(text).into_iter().enumerate() {
            if i > 0 && transitions.is_match(span) {
                out.truncate(out.trim_end().len());
                out.push_str("\n\n");
            }
            out.push_str(span);
        }
        out
    }

    /// Phase 5: regroup the sentences of each paragraph into bounded paragraphs
    pub fn regroup_paragraphs(&self, text: &str) -> String {
        let per_paragraph = self.rules.sentences_per_paragraph;
        let max_chars = self.rules.max_paragraph_chars;
        let mut paragraphs: Vec<String> = Vec::new();

        for block in self.paragraph_break.split(text) {
            let mut group: Vec<String> = Vec::new();
            for s in sentence::sentences(block) {
                let len = s.chars().count();
                if len > max_chars {
                    flush(&mut group, &mut paragraphs);
                    paragraphs.extend(pack_words(&s, max_chars));
                    continue;
                }
                if !group.is_empty() {
                    group.push(s);
                    if group.len() > per_paragraph || sentence::joined_len(&group) > max_chars {
                        let s = group.pop().unwrap_or_default();
                        flush(&mut group, &mut paragraphs);
                        group.push(s);
                    }
                } else {
                    group.push(s);
                }
            }
            flush(&mut group, &mut paragraphs);
        }

        paragraphs.join("\n\n")
    }

    /// Phase 6: trim lines, collapse horizontal runs and blank-line runs
    pub fn collapse_whitespace(&self, text: &str) -> String {
        let lines = text
            .lines()
            .map(|line| self.horizontal_space.replace_all(line.trim(), " ").into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        self.blank_run
            .replace_all(&lines, self.blank_replacement.as_str())
            .trim()
            .to_string()
    }
}

fn flush(group: &mut Vec<String>, paragraphs: &mut Vec<String>) {
    if !group.is_empty() {
        paragraphs.push(sentence::join(group));
        group.clear();
    }
}

/// Greedy word packing for a sentence longer than `max_chars`.
/// Words that are themselves too long (or scripts without spaces) are split by character.
fn pack_words(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in sentence.split(' ') {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len <= max_chars {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
            continue;
        }
        if current_len > 0 {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }

        let chars: Vec<char> = word.chars().collect();
        let mut slices = chars.chunks(max_chars).peekable();
        while let Some(slice) = slices.next() {
            if slices.peek().is_some() {
                pieces.push(slice.iter().collect());
            } else {
                current = slice.iter().collect();
                current_len = slice.len();
            }
        }
    }

    if current_len > 0 {
        pieces.push(current);
    }
    pieces
}
