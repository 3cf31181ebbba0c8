//! Wordlist loading and normalisation

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::ConfigError;

/// Cleanup applied to file-sourced payload lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WordlistOptions {
    /// Entries shorter than this (in characters) are dropped
    pub min_length: usize,
    /// Remove duplicates, keeping the first occurrence
    pub dedupe: bool,
    /// Stable sort by length, then lexicographically
    pub sort_by_length: bool,
}

impl Default for WordlistOptions {
    fn default() -> Self {
        Self {
            min_length: 1,
            dedupe: true,
            sort_by_length: false,
        }
    }
}

/// Load a wordlist file, one entry per line. Blank lines and `#` comments are skipped.
pub fn load_wordlist(path: &Path, options: &WordlistOptions) -> Result<Vec<String>, ConfigError> {
    let wordlist_error = |source| ConfigError::WordlistError {
        path: path.display().to_string(),
        source,
    };

    let file = File::open(path).map_err(wordlist_error)?;
    let reader = BufReader::new(file);

    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(wordlist_error)?;
        if line.trim_start().starts_with('#') {
            continue;
        }
        entries.push(line);
    }

    let words = normalize_wordlist(entries, options);
    tracing::debug!(path = %path.display(), entries = words.len(), "Loaded wordlist");
    Ok(words)
}

/// Trim, filter, dedupe and optionally sort a list of entries
pub fn normalize_wordlist(entries: Vec<String>, options: &WordlistOptions) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut words: Vec<String> = entries
        .into_iter()
        .map(|word| word.trim().to_string())
        .filter(|word| !word.is_empty() && word.chars().count() >= options.min_length)
        .filter(|word| !options.dedupe || seen.insert(word.clone()))
        .collect();

    if options.sort_by_length {
        words.sort_by(|a, b| a.chars().count().cmp(&b.chars().count()).then_with(|| a.cmp(b)));
    }

    words
}
