// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! On-disk and over-the-wire shapes of documents and requirements.

use crate::store::StoreError;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// File holding a document's own settings.
pub const DOCUMENT_FILE: &str = ".document.yml";

/// Extension of requirement files.
pub const REQUIREMENT_EXT: &str = "yml";

/// Validated document id, also used as directory name and uid prefix.
///
/// Starts with an ASCII letter, continues with letters, digits, `_` or `-`,
/// and never ends in a digit so that uids split back unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DocId(String);

impl DocId {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for DocId {
    type Err = StoreError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        let mut chars = id.chars();
        let valid = matches!(chars.next(), Some(first) if first.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            && !id.ends_with(|c: char| c.is_ascii_digit());

        if valid {
            Ok(Self(id.to_string()))
        } else {
            Err(StoreError::InvalidId(id.to_string()))
        }
    }
}

impl Display for DocId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.0)
    }
}

/// Requirement identifier: document prefix plus number.
///
/// Two uids are equal when prefix and number match, regardless of how many
/// digits of zero padding were written.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid {
    pub doc: DocId,
    pub number: u32,
}

impl Uid {
    pub fn new(doc: DocId, number: u32) -> Self {
        Self { doc, number }
    }

    /// Render with `digits` of zero padding, e.g., `SRS001`.
    pub fn render(&self, digits: usize) -> String {
        format!("{}{:0digits$}", self.doc, self.number)
    }

    /// File name of this requirement inside its document directory.
    pub fn file_name(&self, digits: usize) -> String {
        format!("{}.{REQUIREMENT_EXT}", self.render(digits))
    }
}

impl FromStr for Uid {
    type Err = StoreError;

    fn from_str(uid: &str) -> Result<Self, Self::Err> {
        // INVARIANT: Doc ids never end in a digit, so the trailing digits are
        // exactly the number.
        let split = uid.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        if split == uid.len() {
            return Err(StoreError::InvalidId(uid.to_string()));
        }
        let (prefix, digits) = uid.split_at(split);
        let number = digits
            .parse()
            .map_err(|_| StoreError::InvalidId(uid.to_string()))?;

        Ok(Self::new(prefix.parse()?, parse_number(number, uid)?))
    }
}

/// Parse a positive requirement number.
pub fn parse_req_number(number: &str) -> Result<u32, StoreError> {
    let parsed = number
        .trim()
        .parse()
        .map_err(|_| StoreError::InvalidNumber(number.to_string()))?;
    parse_number(parsed, number).map_err(|_| StoreError::InvalidNumber(number.to_string()))
}

fn parse_number(number: u32, raw: &str) -> Result<u32, StoreError> {
    if number == 0 {
        return Err(StoreError::InvalidId(raw.to_string()));
    }
    Ok(number)
}

/// Contents of `<DOC>/.document.yml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFile {
    #[serde(default)]
    pub parent: Option<String>,

    #[serde(default = "default_digits")]
    pub digits: usize,
}

impl DocumentFile {
    pub fn new(parent: Option<&DocId>) -> Self {
        Self {
            parent: parent.map(ToString::to_string),
            digits: default_digits(),
        }
    }
}

impl Default for DocumentFile {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_digits() -> usize {
    3
}

/// Contents of `<DOC>/<UID>.yml`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequirementFile {
    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub links: Vec<String>,
}

/// Requirement as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementView {
    pub id: String,
    pub text: String,
    pub links: Vec<String>,
}

/// Document subtree as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentView {
    pub prefix: String,
    pub parent: Option<String>,
    pub requirements: Vec<RequirementView>,
    pub children: Vec<DocumentView>,
}
