mod keywords;
mod style;

pub use keywords::{HighlightError, KeywordSet, KeywordSpan, PYTHON_KEYWORDS};
pub use style::{Color, ColorParseError, KeywordStyle};
