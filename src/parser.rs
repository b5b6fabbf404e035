//! Regex line parser
//!
//! Upstream stage of the pipeline: splits delimited text into lines and turns
//! each matching line into a `Record`, capture group `i + 1` becoming the
//! value of label `i`.

use crate::error::ParseError;
use crate::record::Record;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DELIMITER: &str = r"\r\n|\n";

/// Serializable parser definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserConfig {
    pub regex: String,
    pub labels: Vec<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

#[derive(Debug, Clone)]
pub struct RegexParser {
    regex: Regex,
    labels: Vec<String>,
    delimiter: Regex,
}

impl RegexParser {
    pub fn new(config: &ParserConfig) -> Result<Self, ParseError> {
        if config.labels.is_empty() {
            return Err(ParseError::NoLabels);
        }
        Ok(RegexParser {
            regex: Regex::new(&config.regex)?,
            labels: config.labels.clone(),
            delimiter: Regex::new(&config.delimiter)?,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Parse one line. Non-matching lines yield `None`; groups that did not
    /// participate in the match yield empty values.
    pub fn parse_line(&self, line: &str) -> Option<Record> {
        let caps = self.regex.captures(line)?;
        let mut record = Record::with_capacity(self.labels.len());
        for (i, label) in self.labels.iter().enumerate() {
            let value = caps.get(i + 1).map(|m| m.as_str()).unwrap_or_default();
            record.insert(label.as_str(), value);
        }
        Some(record)
    }

    /// Parse a whole text, skipping empty chunks and non-matching lines
    pub fn parse_str<'a>(&'a self, text: &'a str) -> impl Iterator<Item = Record> + 'a {
        self.delimiter
            .split(text)
            .filter(|line| !line.is_empty())
            .filter_map(move |line| self.parse_line(line))
    }
}
