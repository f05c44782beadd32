pub mod document;

pub use document::{Document, DocumentError, LineEnding, TextEncoding};
