//! Splitting input text into ordered, bounded-size units.

mod prompt;
mod sentences;

pub use prompt::{PromptTemplate, DEFAULT_DIRECTIVE};
pub use sentences::{RuleBasedDetector, SentenceDetector};

use crate::error::PipelineError;
use serde::Serialize;

/// One unit of work. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    index: usize,
    /// Text handed to the inference client (directive + sentences).
    content: String,
    /// The unit's sentences joined with single spaces, before wrapping.
    source: String,
    sentence_count: usize,
}

impl Unit {
    /// A unit whose content is sent as-is (no prompt wrapping).
    pub fn new(index: usize, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            index,
            source: content.clone(),
            content,
            sentence_count: 1,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn sentence_count(&self) -> usize {
        self.sentence_count
    }
}

/// Groups detected sentences into units of `unit_size` and wraps each with
/// the prompt template.
pub struct Segmenter {
    detector: Box<dyn SentenceDetector>,
    template: PromptTemplate,
}

impl Segmenter {
    pub fn new(detector: Box<dyn SentenceDetector>, template: PromptTemplate) -> Self {
        Self { detector, template }
    }

    /// English rule-based detector with the given template.
    pub fn with_template(template: PromptTemplate) -> Self {
        Self::new(Box::new(RuleBasedDetector::english()), template)
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Split `text` into units of exactly `unit_size` sentences; the last
    /// unit holds the remainder. Indices are contiguous from 0.
    pub fn segment(&self, text: &str, unit_size: usize) -> Result<Vec<Unit>, PipelineError> {
        if unit_size == 0 {
            return Err(PipelineError::Config(
                "unit_size must be greater than 0".to_string(),
            ));
        }

        let sentences = self.detector.split(text);
        let units: Vec<Unit> = sentences
            .chunks(unit_size)
            .enumerate()
            .map(|(index, group)| {
                let source = group.join(" ");
                Unit {
                    index,
                    content: self.template.wrap(&source),
                    source,
                    sentence_count: group.len(),
                }
            })
            .collect();

        tracing::debug!(
            "Segmented {} sentences into {} units of up to {}",
            sentences.len(),
            units.len(),
            unit_size
        );

        Ok(units)
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::with_template(PromptTemplate::default())
    }
}

/// Size statistics over a segmented input.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SegmentStats {
    pub units: usize,
    pub sentences: usize,
    pub min_unit_chars: usize,
    pub max_unit_chars: usize,
    pub avg_unit_chars: f64,
    pub total_prompt_chars: usize,
}

impl SegmentStats {
    pub fn from_units(units: &[Unit]) -> Self {
        if units.is_empty() {
            return Self::default();
        }

        let sizes: Vec<usize> = units.iter().map(|u| u.source().chars().count()).collect();
        Self {
            units: units.len(),
            sentences: units.iter().map(Unit::sentence_count).sum(),
            min_unit_chars: sizes.iter().copied().min().unwrap_or(0),
            max_unit_chars: sizes.iter().copied().max().unwrap_or(0),
            avg_unit_chars: sizes.iter().sum::<usize>() as f64 / units.len() as f64,
            total_prompt_chars: units.iter().map(|u| u.content().chars().count()).sum(),
        }
    }
}

impl std::fmt::Display for SegmentStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Units: {}, Sentences: {}, Unit chars min/avg/max: {}/{:.0}/{}, Prompt chars: {}",
            self.units,
            self.sentences,
            self.min_unit_chars,
            self.avg_unit_chars,
            self.max_unit_chars,
            self.total_prompt_chars
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(units: &[Unit]) -> Vec<&str> {
        units.iter().map(Unit::source).collect()
    }

    #[test]
    fn test_five_sentences_in_pairs() {
        let units = Segmenter::default().segment("A. B. C. D. E.", 2).unwrap();

        assert_eq!(sources(&units), vec!["A. B.", "C. D.", "E."]);
        assert_eq!(
            units.iter().map(Unit::index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(units[2].sentence_count(), 1);
    }

    #[test]
    fn test_content_is_wrapped() {
        let segmenter = Segmenter::with_template(PromptTemplate::new("Shout it."));
        let units = segmenter.segment("Hello. World.", 5).unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].source(), "Hello. World.");
        assert_eq!(units[0].content(), PromptTemplate::new("Shout it.").wrap("Hello. World."));
    }

    #[test]
    fn test_exact_multiple_has_no_remainder() {
        let units = Segmenter::default().segment("A. B. C. D.", 2).unwrap();
        assert_eq!(sources(&units), vec!["A. B.", "C. D."]);
    }

    #[test]
    fn test_segment_is_deterministic() {
        let text = "Dr. Smith arrived. The meeting began! Was it late? No.\n\nNew paragraph here.";
        let segmenter = Segmenter::default();

        let first = segmenter.segment(text, 2).unwrap();
        let second = segmenter.segment(text, 2).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_empty_text_yields_no_units() {
        assert!(Segmenter::default().segment("", 3).unwrap().is_empty());
        assert!(Segmenter::default().segment("  \n ", 3).unwrap().is_empty());
    }

    #[test]
    fn test_zero_unit_size_is_config_error() {
        let err = Segmenter::default().segment("A. B.", 0).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_segment_stats() {
        let units = Segmenter::default().segment("Aa. Bb. Cccc.", 2).unwrap();
        let stats = SegmentStats::from_units(&units);

        assert_eq!(stats.units, 2);
        assert_eq!(stats.sentences, 3);
        assert_eq!(stats.min_unit_chars, 5);
        assert_eq!(stats.max_unit_chars, 7);
        assert!(format!("{}", stats).contains("Units: 2"));
    }
}
