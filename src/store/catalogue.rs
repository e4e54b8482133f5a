// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-user repository catalogue.
//!
//! Plain text file listing the repositories a user has cloned, one
//! `<name> <url>` pair per line. Lines that do not split into exactly two
//! fields are skipped.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io,
    path::Path,
    str::FromStr,
};
use tracing::{debug, warn};

/// Repository name to remote URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalogue {
    entries: BTreeMap<String, String>,
}

impl Catalogue {
    /// Read catalogue at target path. Missing file means empty catalogue.
    ///
    /// # Errors
    ///
    /// - Return [`io::Error`] if the file exists but cannot be read.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        match fs::read_to_string(path.as_ref()) {
            Ok(data) => Ok(data.parse().unwrap_or_default()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(error),
        }
    }

    /// Write catalogue to target path, creating parent directories.
    ///
    /// # Errors
    ///
    /// - Return [`io::Error`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            mkdirp::mkdirp(parent)?;
        }
        fs::write(path.as_ref(), self.to_string())
    }

    /// Record a repository, replacing any previous URL.
    pub fn insert(&mut self, name: impl Into<String>, url: impl Into<String>) {
        self.entries.insert(name.into(), url.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }
}

impl FromStr for Catalogue {
    type Err = std::convert::Infallible;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut entries = BTreeMap::new();
        for (number, line) in data.lines().enumerate() {
            let fields = line.split_whitespace().collect::<Vec<_>>();
            match fields.as_slice() {
                [] => {}
                [name, url] => {
                    entries.insert(name.to_string(), url.to_string());
                }
                _ => warn!("skip malformed catalogue line {}: {line:?}", number + 1),
            }
        }
        debug!("catalogue lists {} repositories", entries.len());

        Ok(Self { entries })
    }
}

impl Display for Catalogue {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for (name, url) in &self.entries {
            writeln!(fmt, "{name} {url}")?;
        }
        Ok(())
    }
}
