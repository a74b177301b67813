use regex::Regex;

use super::PlateRecord;
use crate::error::Result;

/// Two letters, three digits, two letters, hyphens optional (`AB-123-CD`).
pub const PLATE_PATTERN: &str = r"[A-Z]{2}-?[0-9]{3}-?[A-Z]{2}";

pub struct FormatValidator {
    pattern: Regex,
    min_len: usize,
}

impl FormatValidator {
    pub fn new(min_len: usize) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(PLATE_PATTERN)?,
            min_len,
        })
    }

    /// Accepts text that is long enough and contains the plate pattern
    /// somewhere. Noise around the match is kept in the record.
    pub fn validate(&self, text: &str) -> Option<PlateRecord> {
        if text.chars().count() < self.min_len {
            return None;
        }
        if !self.pattern.is_match(text) {
            return None;
        }
        Some(PlateRecord::new(text.to_string()))
    }
}
