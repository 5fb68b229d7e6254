//! URL rewriting: substitute migrated URLs into the document.
//!
//! Only the strings [`super::extract`] scans are touched, so every rewrite
//! corresponds to a URL that was actually found there. The input document is
//! never modified; a new [`Value`] is returned.
//!
//! When one mapped URL is a prefix or substring of another
//! (`…/a.png` and `…/a.png?v=2`), each position in the text is replaced by
//! the longest mapped URL that matches there, in a single left-to-right pass.
//! Replaced text is never scanned again.

use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Return a copy of `document` with every mapped URL replaced in its
/// top-level string elements. An empty mapping returns an identical copy.
pub fn rewrite_document(document: &Value, mapping: &HashMap<String, String>) -> Value {
    if mapping.keys().all(String::is_empty) {
        return document.clone();
    }
    let matcher = Matcher::new(mapping);

    match document {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Value::String(matcher.rewrite(s)),
                    other => other.clone(),
                })
                .collect(),
        ),
        Value::String(s) => Value::String(matcher.rewrite(s)),
        other => other.clone(),
    }
}

struct Matcher<'m> {
    mapping: &'m HashMap<String, String>,
    /// Non-empty keys, longest first.
    keys: Vec<&'m str>,
    /// Alternation of `keys`; leftmost-first semantics picks the longest
    /// candidate at each position.
    regex: Option<Regex>,
}

impl<'m> Matcher<'m> {
    fn new(mapping: &'m HashMap<String, String>) -> Self {
        let mut keys: Vec<&str> = mapping
            .keys()
            .map(String::as_str)
            .filter(|k| !k.is_empty())
            .collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let pattern = keys
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let regex = match RegexBuilder::new(&pattern).size_limit(REGEX_SIZE_LIMIT).build() {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("URL matcher too large ({}); falling back to a linear scan", e);
                None
            }
        };
        Self {
            mapping,
            keys,
            regex,
        }
    }

    fn rewrite(&self, s: &str) -> String {
        match &self.regex {
            Some(re) => re
                .replace_all(s, |caps: &regex::Captures<'_>| {
                    self.mapping
                        .get(&caps[0])
                        .cloned()
                        .unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned(),
            None => self.scan(s),
        }
    }

    fn scan(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(c) = rest.chars().next() {
            match self.keys.iter().find(|k| rest.starts_with(**k)) {
                Some(key) => {
                    out.push_str(&self.mapping[*key]);
                    rest = &rest[key.len()..];
                }
                None => {
                    out.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
        out
    }
}

const REGEX_SIZE_LIMIT: usize = 64 * 1024 * 1024;
