//! Sentence boundary detection.

use std::collections::HashSet;

/// Splits text into an ordered sequence of sentences.
pub trait SentenceDetector: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

/// Abbreviations that end with a period but do not end a sentence.
const ENGLISH_ABBREVIATIONS: &[&str] = &[
    "dr.", "mr.", "mrs.", "ms.", "prof.", "jr.", "sr.", "st.", "mt.", "vs.", "etc.", "e.g.",
    "i.e.", "cf.", "approx.", "dept.", "est.", "fig.", "no.", "vol.", "pp.", "inc.", "ltd.",
    "co.", "corp.", "jan.", "feb.", "mar.", "apr.", "jun.", "jul.", "aug.", "sep.", "sept.",
    "oct.", "nov.", "dec.", "a.m.", "p.m.", "u.s.", "u.k.",
];

/// Punctuation-driven detector with a per-language abbreviation list.
///
/// Rules:
/// - blank lines always separate sentences (paragraph breaks);
/// - whitespace inside a paragraph, line breaks included, collapses to one space;
/// - `.`, `!`, `?` and `…` end a sentence when followed by whitespace and a
///   character that is not lowercase, or by the end of the paragraph;
/// - closing quotes and brackets directly after the terminator stay with the
///   sentence;
/// - a period ending a known abbreviation is not a boundary.
#[derive(Debug, Clone)]
pub struct RuleBasedDetector {
    abbreviations: HashSet<String>,
}

impl RuleBasedDetector {
    pub fn new<I, S>(abbreviations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            abbreviations: abbreviations
                .into_iter()
                .map(|a| a.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn english() -> Self {
        Self::new(ENGLISH_ABBREVIATIONS.iter())
    }

    /// Add abbreviations on top of the current list.
    pub fn with_abbreviations<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.abbreviations
            .extend(extra.into_iter().map(|a| a.as_ref().to_lowercase()));
        self
    }

    fn is_abbreviation(&self, text_through_period: &str) -> bool {
        let word = text_through_period
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("")
            .trim_start_matches(|c: char| is_opening(c));
        self.abbreviations.contains(&word.to_lowercase())
    }

    fn split_paragraph(&self, paragraph: &str, out: &mut Vec<String>) {
        let chars: Vec<(usize, char)> = paragraph.char_indices().collect();
        let mut start = 0;
        let mut i = 0;

        while i < chars.len() {
            let (pos, c) = chars[i];
            if !is_terminal(c) {
                i += 1;
                continue;
            }

            let mut j = i + 1;
            while j < chars.len() && (is_terminal(chars[j].1) || is_closing(chars[j].1)) {
                j += 1;
            }

            let boundary = if j >= chars.len() {
                true
            } else {
                chars[j].1.is_whitespace()
                    && chars
                        .get(j + 1)
                        .map_or(true, |&(_, next)| !next.is_lowercase())
                    && !(c == '.' && self.is_abbreviation(&paragraph[start..pos + c.len_utf8()]))
            };

            if boundary {
                let end = chars.get(j).map_or(paragraph.len(), |&(p, _)| p);
                push_trimmed(&paragraph[start..end], out);
                start = end;
            }
            i = j;
        }

        push_trimmed(&paragraph[start..], out);
    }
}

impl Default for RuleBasedDetector {
    fn default() -> Self {
        Self::english()
    }
}

impl SentenceDetector for RuleBasedDetector {
    fn split(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        for paragraph in paragraphs(text) {
            self.split_paragraph(&paragraph, &mut sentences);
        }
        sentences
    }
}

/// Paragraphs separated by blank lines, with inner whitespace collapsed.
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut words: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !words.is_empty() {
                out.push(words.join(" "));
                words.clear();
            }
            continue;
        }
        words.extend(line.split_whitespace());
    }
    if !words.is_empty() {
        out.push(words.join(" "));
    }
    out
}

fn push_trimmed(sentence: &str, out: &mut Vec<String>) {
    let sentence = sentence.trim();
    if !sentence.is_empty() {
        out.push(sentence.to_string());
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '”' | '’' | '»')
}

fn is_opening(c: char) -> bool {
    matches!(c, '"' | '\'' | '(' | '[' | '“' | '‘' | '«')
}
