//! Tab-delimited text streams for save files.
//!
//! Each record is one line of fields separated by tabs. Readers split on any
//! whitespace, so individual fields must never contain whitespace; the
//! writer rejects such fields instead of producing an unreadable line.

use std::fmt::Display;
use std::str::{FromStr, SplitWhitespace};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while writing or reading stream fields.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("field '{field}' is empty or contains whitespace: {value:?}")]
    UnwritableField { field: &'static str, value: String },

    #[error("stream ended before field '{field}'")]
    UnexpectedEnd { field: &'static str },

    #[error("invalid value for field '{field}': {value:?}")]
    InvalidField { field: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// StreamWriter
// ---------------------------------------------------------------------------

/// Builds one tab-delimited record.
#[derive(Debug, Clone, Default)]
pub struct StreamWriter {
    line: String,
}

impl StreamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. `name` is only used in the error.
    pub fn field<T: Display + ?Sized>(
        &mut self,
        name: &'static str,
        value: &T,
    ) -> Result<&mut Self, StreamError> {
        let text = value.to_string();
        if text.is_empty() || text.chars().any(char::is_whitespace) {
            return Err(StreamError::UnwritableField {
                field: name,
                value: text,
            });
        }
        if !self.line.is_empty() {
            self.line.push('\t');
        }
        self.line.push_str(&text);
        Ok(self)
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// Finish the record. The returned line has no trailing newline.
    pub fn finish(self) -> String {
        self.line
    }
}

// ---------------------------------------------------------------------------
// StreamReader
// ---------------------------------------------------------------------------

/// Sequential reader over whitespace-separated fields.
#[derive(Debug, Clone)]
pub struct StreamReader<'a> {
    tokens: SplitWhitespace<'a>,
}

impl<'a> StreamReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            tokens: text.split_whitespace(),
        }
    }

    /// Next raw token.
    pub fn token(&mut self, field: &'static str) -> Result<&'a str, StreamError> {
        self.tokens
            .next()
            .ok_or(StreamError::UnexpectedEnd { field })
    }

    /// Next token parsed as `T`.
    pub fn parse<T: FromStr>(&mut self, field: &'static str) -> Result<T, StreamError> {
        let token = self.token(field)?;
        token.parse().map_err(|_| StreamError::InvalidField {
            field,
            value: token.to_string(),
        })
    }

    /// Whether every token has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.tokens.clone().next().is_none()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
