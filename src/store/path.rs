//! Store Path Addressing
//!
//! Dotted or slash-delimited address chains into the nested store document.
//! The first segment selects the backing shard (one document per channel),
//! the remaining segments walk the nested mapping inside it.

use std::fmt;

use super::StoreError;

/// A parsed store path: a non-empty chain of address segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// Parse a dot- or slash-delimited path.
    ///
    /// Delimiters may be mixed (`"chan.proofs/submitted"`); empty segments
    /// and empty input are rejected.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let segments: Vec<String> = raw
            .split(|c| c == '.' || c == '/')
            .map(str::to_string)
            .collect();

        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(StoreError::EmptyPath);
        }

        Ok(Self { segments })
    }

    /// The shard this path addresses (first segment).
    pub fn shard(&self) -> &str {
        &self.segments[0]
    }

    /// Segments below the shard root.
    pub fn rest(&self) -> Vec<&str> {
        self.segments[1..].iter().map(String::as_str).collect()
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}
