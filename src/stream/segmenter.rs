//! Sentence and paragraph segmentation
//!
//! Splits incrementally arriving text into statements suitable for speech.
//! A segment always keeps its trailing whitespace, so concatenating the
//! segments of a text gives the text back.

use once_cell::sync::Lazy;
use regex::Regex;

/// Blank-line markers separating paragraphs
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r\n\r\n|\n\n|\r\r").expect("paragraph break pattern is valid"));

/// Default number of characters buffered before sentence splitting is tried
pub const DEFAULT_MIN_LENGTH: usize = 100;

/// How statements are cut from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentMode {
    /// Locale-aware sentences, flushed once the buffer reaches `min_length` chars
    Sentence { locale: String, min_length: usize },
    /// Paragraphs delimited by blank lines
    Paragraph,
}

impl SegmentMode {
    pub fn sentence(locale: impl Into<String>) -> Self {
        SegmentMode::Sentence {
            locale: locale.into(),
            min_length: DEFAULT_MIN_LENGTH,
        }
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…' | '‼' | '⁇' | '⁈' | '⁉')
}

fn is_full_width_terminator(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '｡' | '؟' | '।' | '॥')
}

fn is_closer(c: char) -> bool {
    matches!(
        c,
        '"' | '\'' | ')' | ']' | '}' | '»' | '”' | '’' | '」' | '』' | '）' | '】' | '》' | '〉' | '＂'
    )
}

fn is_line_break(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2029}' | '\u{85}')
}

/// Words ending in a period that don't end a sentence, per language
fn abbreviations(language: &str) -> &'static [&'static str] {
    match language {
        "en" => &[
            "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e", "inc",
            "ltd", "co", "no", "fig", "approx", "dept",
        ],
        "de" => &["z.b", "bzw", "usw", "dr", "nr", "ca", "vgl", "str", "evtl", "ggf"],
        "fr" => &["m", "mme", "mlle", "dr", "etc", "p.ex", "cf", "av"],
        "es" => &["sr", "sra", "srta", "dr", "dra", "etc", "p.ej", "ud", "uds"],
        "it" => &["sig", "dott", "ecc", "es", "prof"],
        "pt" => &["sr", "sra", "dr", "dra", "etc", "ex"],
        _ => &[],
    }
}

/// Primary language subtag of a BCP 47 locale, lowercased
fn language_of(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Whether the period at `chars[dot]` closes a known abbreviation
fn ends_abbreviation(chars: &[(usize, char)], dot: usize, known: &[&str]) -> bool {
    if known.is_empty() {
        return false;
    }
    let mut start = dot;
    while start > 0 {
        let c = chars[start - 1].1;
        if c.is_alphabetic() || c == '.' {
            start -= 1;
        } else {
            break;
        }
    }
    if start == dot {
        return false;
    }
    let word: String = chars[start..dot]
        .iter()
        .map(|(_, c)| c.to_lowercase().to_string())
        .collect();
    known.contains(&word.as_str())
}

/// Split `text` into sentences for `locale`
///
/// Boundaries fall after terminal punctuation (plus closing quotes and
/// brackets) that is followed by whitespace, after full-width terminators
/// regardless of what follows, and after line breaks. A period does not end
/// a sentence when it closes a known abbreviation or is followed by a
/// lowercase word. Text after the last boundary forms the final segment.
pub fn split_sentences<'a>(text: &'a str, locale: &str) -> Vec<&'a str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let known = abbreviations(&language_of(locale));
    let offset = |idx: usize| chars.get(idx).map(|(o, _)| *o).unwrap_or(text.len());

    let mut segments = Vec::new();
    let mut seg_start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i].1;
        let boundary = if is_line_break(c) {
            let mut j = i + 1;
            while j < chars.len() && is_line_break(chars[j].1) {
                j += 1;
            }
            Some(j)
        } else if is_full_width_terminator(c) {
            let mut j = i + 1;
            while j < chars.len()
                && (is_full_width_terminator(chars[j].1) || is_closer(chars[j].1))
            {
                j += 1;
            }
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            Some(j)
        } else if is_terminator(c) {
            let mut j = i + 1;
            while j < chars.len() && (is_terminator(chars[j].1) || is_closer(chars[j].1)) {
                j += 1;
            }
            if j < chars.len() && chars[j].1.is_whitespace() {
                let mut k = j;
                while k < chars.len() && chars[k].1.is_whitespace() {
                    k += 1;
                }
                let lowercase_follows = chars.get(k).is_some_and(|(_, n)| n.is_lowercase());
                if c == '.' && (lowercase_follows || ends_abbreviation(&chars, i, known)) {
                    i = j;
                    continue;
                }
                Some(k)
            } else {
                // "3.14", "example.com", or punctuation at the very end.
                i = j;
                continue;
            }
        } else {
            None
        };

        match boundary {
            Some(end) => {
                let end_offset = offset(end);
                if end_offset > seg_start {
                    segments.push(&text[seg_start..end_offset]);
                    seg_start = end_offset;
                }
                i = end;
            }
            None => i += 1,
        }
    }

    if seg_start < text.len() {
        segments.push(&text[seg_start..]);
    }
    segments
}

/// Split on blank-line markers; the last piece may be incomplete
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK.split(text).collect()
}

/// Prepare a statement for speech: drop markdown emphasis, tighten spacing
pub fn speech_text(statement: &str) -> String {
    statement.replace('*', "").replace("\n\n", "\n")
}

/// Stateful segmenter fed with decoded text
#[derive(Debug, Clone)]
pub struct Segmenter {
    mode: SegmentMode,
    buffer: String,
}

impl Segmenter {
    pub fn new(mode: SegmentMode) -> Self {
        Self {
            mode,
            buffer: String::new(),
        }
    }

    pub fn mode(&self) -> &SegmentMode {
        &self.mode
    }

    /// Text held back waiting for a boundary
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Add a chunk and return the statements it completed
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        match &self.mode {
            SegmentMode::Sentence { locale, min_length } => {
                if self.buffer.chars().count() < *min_length {
                    return Vec::new();
                }
                let segments = split_sentences(&self.buffer, locale);
                let Some((last, complete)) = segments.split_last() else {
                    return Vec::new();
                };
                let statement: String = complete.concat();
                let rest = last.to_string();
                self.buffer = rest;
                if statement.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![statement]
                }
            }
            SegmentMode::Paragraph => {
                let pieces = split_paragraphs(&self.buffer);
                let Some((last, complete)) = pieces.split_last() else {
                    return Vec::new();
                };
                let statements: Vec<String> = complete
                    .iter()
                    .filter(|p| !p.trim().is_empty())
                    .map(|p| p.to_string())
                    .collect();
                let rest = last.to_string();
                self.buffer = rest;
                statements
            }
        }
    }

    /// Flush whatever remains at end of stream
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_basic_sentences() {
        let parts = split_sentences("Hello there! How are you? I am fine.", "en-US");
        assert_eq!(parts, vec!["Hello there! ", "How are you? ", "I am fine."]);
    }

    #[test]
    fn test_segments_concatenate_to_input() {
        let text = "First line.\nSecond \"quoted.\" Third... and more?! Yes 3.14 is pi.";
        let parts = split_sentences(text, "en");
        assert_eq!(parts.concat(), text);
    }

    #[test]
    fn test_abbreviations_and_decimals() {
        let parts = split_sentences("Dr. Smith paid $3.50 for it. Then he left.", "en-GB");
        assert_eq!(parts, vec!["Dr. Smith paid $3.50 for it. ", "Then he left."]);

        // Without the English list "Dr." ends a sentence.
        let parts = split_sentences("Dr. Smith", "ja");
        assert_eq!(parts, vec!["Dr. ", "Smith"]);
    }

    #[test]
    fn test_lowercase_after_period_does_not_split() {
        let parts = split_sentences("Version 2. is out. Nice.", "xx");
        assert_eq!(parts, vec!["Version 2. is out. ", "Nice."]);
    }

    #[test]
    fn test_cjk_terminators_without_spaces() {
        let parts = split_sentences("今天天气很好。我们去公园吧！好「的」？", "zh-CN");
        assert_eq!(parts, vec!["今天天气很好。", "我们去公园吧！", "好「的」？"]);
    }

    #[test]
    fn test_line_breaks_end_sentences() {
        let parts = split_sentences("- item one\n- item two\n\nDone", "en");
        assert_eq!(parts, vec!["- item one\n", "- item two\n\n", "Done"]);
    }

    #[test]
    fn test_sentence_mode_waits_for_min_length() {
        let mut seg = Segmenter::new(SegmentMode::Sentence {
            locale: "en".to_string(),
            min_length: 30,
        });
        assert!(seg.push("Short one. ").is_empty());
        let out = seg.push("Another sentence here. And a tail");
        assert_eq!(out, vec!["Short one. Another sentence here. "]);
        assert_eq!(seg.pending(), "And a tail");
        assert_eq!(seg.finish().as_deref(), Some("And a tail"));
        assert_eq!(seg.finish(), None);
    }

    #[test]
    fn test_sentence_mode_single_long_sentence_is_held() {
        let mut seg = Segmenter::new(SegmentMode::Sentence {
            locale: "en".to_string(),
            min_length: 5,
        });
        assert!(seg.push("no boundary in this run").is_empty());
        assert_eq!(seg.pending(), "no boundary in this run");
    }

    #[test]
    fn test_paragraph_mode() {
        let mut seg = Segmenter::new(SegmentMode::Paragraph);
        assert!(seg.push("First para").is_empty());
        let out = seg.push("graph.\n\nSecond.\r\n\r\nThi");
        assert_eq!(out, vec!["First paragraph.", "Second."]);
        assert_eq!(seg.finish().as_deref(), Some("Thi"));
    }

    #[test]
    fn test_paragraph_marker_split_across_chunks() {
        let mut seg = Segmenter::new(SegmentMode::Paragraph);
        assert!(seg.push("One\n").is_empty());
        assert_eq!(seg.push("\nTwo"), vec!["One"]);
    }

    #[test]
    fn test_speech_text_cleanup() {
        assert_eq!(speech_text("**Bold** item\n\nnext"), "Bold item\nnext");
    }
}
