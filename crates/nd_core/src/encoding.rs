//! Repair of UTF-8 punctuation that was decoded as Windows-1252 upstream.

use std::path::Path;

use crate::Result;

/// Ordered `garbled -> replacement` table applied in a single left-to-right pass.
///
/// At each position the first matching entry wins and the scan resumes after
/// the matched text, so replacements are never rescanned. Longer sequences
/// must come before their prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingRepair {
    table: Vec<(String, String)>,
}

impl Default for EncodingRepair {
    fn default() -> Self {
        let table = [
            ("\u{e2}\u{20ac}\u{2122}", "\u{2019}"), // right single quote
            ("\u{e2}\u{20ac}\u{2dc}", "\u{2018}"),  // left single quote
            ("\u{e2}\u{20ac}\u{153}", "\u{201c}"),  // left double quote
            ("\u{e2}\u{20ac}\u{9d}", "\u{201d}"),   // right double quote
            ("\u{e2}\u{20ac}\u{201d}", "\u{2014}"), // em dash
            ("\u{e2}\u{20ac}\u{201c}", "\u{2013}"), // en dash
            ("\u{e2}\u{20ac}\u{a6}", "\u{2026}"),   // ellipsis
            ("\u{e2}\u{20ac}", "\u{201d}"),         // right double quote, trailing byte lost
        ];
        Self::new(
            table
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        )
    }
}

impl EncodingRepair {
    pub fn new(table: Vec<(String, String)>) -> Self {
        let table = table.into_iter().filter(|(from, _)| !from.is_empty()).collect();
        Self { table }
    }

    /// Load a table from a JSON file of `[garbled, replacement]` pairs.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let table: Vec<(String, String)> = serde_json::from_str(&raw)?;
        Ok(Self::new(table))
    }

    pub fn table(&self) -> &[(String, String)] {
        &self.table
    }

    pub fn repair(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        'scan: while let Some(c) = rest.chars().next() {
            for (from, to) in &self.table {
                if rest.starts_with(from.as_str()) {
                    out.push_str(to);
                    rest = &rest[from.len()..];
                    continue 'scan;
                }
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
        out
    }
}
