use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// Python keywords recognised by the editor.
/// （編輯器辨識的 Python 關鍵字。）
pub const PYTHON_KEYWORDS: &[&str] = &[
    "def", "return", "if", "else", "elif", "import", "for", "while", "class", "try", "except",
    "finally", "with", "as",
];

static PYTHON_SET: Lazy<KeywordSet> = Lazy::new(|| {
    KeywordSet::new(PYTHON_KEYWORDS.iter().copied())
        .expect("built-in python keyword set must compile")
});

#[derive(Debug, Error)]
pub enum HighlightError {
    #[error("keyword set must not be empty")]
    EmptyKeywordSet,
    #[error("keyword regex compile error: {0}")]
    RegexCompilation(String),
}

/// A whole-word occurrence of some keyword, as a byte range into the scanned text.
/// （關鍵字的完整單字出現位置，以位元組範圍表示。）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSpan {
    pub range: Range<usize>,
}

/// Immutable keyword set with a pre-compiled whole-word matcher.
/// （不可變的關鍵字集合，附帶預先編譯的完整單字比對器。）
///
/// Matching is a single linear scan of the input with one alternation
/// regex bounded by `\b` on both sides, so `def` never matches inside
/// `define` or `undefined`.
#[derive(Debug)]
pub struct KeywordSet {
    keywords: Vec<String>,
    matcher: Regex,
}

impl KeywordSet {
    pub fn new<I, S>(keywords: I) -> Result<Self, HighlightError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords: Vec<String> = keywords.into_iter().map(Into::into).collect();
        if keywords.is_empty() {
            return Err(HighlightError::EmptyKeywordSet);
        }
        let matcher = build_keyword_regex(&keywords)?;
        Ok(Self { keywords, matcher })
    }

    /// The process-wide Python keyword set, built once at first use.
    /// （全程序共用的 Python 關鍵字集合，首次使用時建立一次。）
    pub fn python() -> &'static KeywordSet {
        &PYTHON_SET
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Scans the whole input and returns every whole-word keyword span,
    /// sorted and non-overlapping. Pure function of the input text.
    /// （掃描整份輸入並回傳所有完整單字的關鍵字範圍，已排序且不重疊。）
    pub fn spans(&self, input: &str) -> Vec<KeywordSpan> {
        self.matcher
            .find_iter(input)
            .map(|found| KeywordSpan {
                range: found.start()..found.end(),
            })
            .collect()
    }
}

fn build_keyword_regex(keywords: &[String]) -> Result<Regex, HighlightError> {
    let pattern = keywords
        .iter()
        .map(|keyword| regex::escape(keyword))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(r"\b({pattern})\b");
    RegexBuilder::new(&pattern)
        .multi_line(true)
        .build()
        .map_err(|err| HighlightError::RegexCompilation(format!("keyword regex: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched<'a>(set: &KeywordSet, input: &'a str) -> Vec<&'a str> {
        set.spans(input)
            .into_iter()
            .map(|span| &input[span.range])
            .collect()
    }

    #[test]
    fn tags_standalone_keyword_but_not_embedded_occurrences() {
        let set = KeywordSet::python();
        let input = "def define undefined";
        let spans = set.spans(input);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].range, 0..3);
        assert_eq!(matched(set, input), vec!["def"]);
    }

    #[test]
    fn finds_every_keyword_occurrence_across_lines() {
        let set = KeywordSet::python();
        let input = "import turtle\nfor i in range(4):\n    if i:\n        pass\n";
        assert_eq!(matched(set, input), vec!["import", "for", "if"]);
    }

    #[test]
    fn spans_are_sorted_and_non_overlapping() {
        let set = KeywordSet::python();
        let spans = set.spans("try:\n    import os\nexcept ImportError:\n    pass\n");
        for pair in spans.windows(2) {
            assert!(pair[0].range.end <= pair[1].range.start);
        }
    }

    #[test]
    fn highlighting_is_idempotent_on_unchanged_text() {
        let set = KeywordSet::python();
        let input = "class Shape:\n    def area(self):\n        return 0\n";
        assert_eq!(set.spans(input), set.spans(input));
    }

    #[test]
    fn empty_input_yields_no_spans() {
        assert!(KeywordSet::python().spans("").is_empty());
    }

    #[test]
    fn empty_keyword_set_is_rejected() {
        let err = KeywordSet::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, HighlightError::EmptyKeywordSet));
    }

    #[test]
    fn keywords_with_regex_metacharacters_are_escaped() {
        let set = KeywordSet::new(["a+b"]).unwrap();
        assert!(set.spans("aab").is_empty());
        assert_eq!(matched(&set, "a+b"), vec!["a+b"]);
    }
}
