//! Ordered regex rule tables.
//!
//! A table is evaluated top to bottom and stops at the first rule whose
//! pattern matches and whose extractor accepts the captures.

use regex::{Captures, Regex};

/// A compiled pattern paired with the function that turns its captures into a value.
pub struct Rule<T> {
    pub name: &'static str,
    regex: Regex,
    extract: fn(&Captures<'_>) -> Option<T>,
}

impl<T> Rule<T> {
    /// Panics on an invalid pattern; tables are static and covered by tests.
    pub fn new(name: &'static str, pattern: &str, extract: fn(&Captures<'_>) -> Option<T>) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).unwrap(),
            extract,
        }
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// First capture set in `text` the extractor accepts.
    pub fn apply(&self, text: &str) -> Option<T> {
        self.regex
            .captures_iter(text)
            .find_map(|caps| (self.extract)(&caps))
    }
}

pub struct RuleTable<T> {
    rules: Vec<Rule<T>>,
}

impl<T> RuleTable<T> {
    pub fn new(rules: Vec<Rule<T>>) -> Self {
        Self { rules }
    }

    /// Value from the highest-priority matching rule, with that rule's name.
    pub fn first_match(&self, text: &str) -> Option<(&'static str, T)> {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(text).map(|value| (rule.name, value)))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.name)
    }
}

/// Extractor returning capture group 1 trimmed, rejecting empty captures.
pub fn group1(caps: &Captures<'_>) -> Option<String> {
    caps.get(1)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}
