//! Subscription tag expressions.
//!
//! `"*"` (or an empty expression) accepts every message. Otherwise the
//! expression is a `||`-separated list of tags, e.g. `"TagA || TagC || TagD"`,
//! and a message is accepted when its tag is one of them. Messages without a
//! tag only match `"*"`.

use crate::error::{ClientError, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagFilter {
    All,
    Tags(BTreeSet<String>),
}

impl TagFilter {
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        if expression.is_empty() || expression == "*" {
            return Ok(TagFilter::All);
        }

        let mut tags = BTreeSet::new();
        for tag in expression.split("||").map(str::trim) {
            if tag.is_empty() || tag == "*" || tag.contains(char::is_whitespace) {
                return Err(ClientError::InvalidFilter(expression.to_string()));
            }
            tags.insert(tag.to_string());
        }
        Ok(TagFilter::Tags(tags))
    }

    pub fn matches(&self, tag: Option<&str>) -> bool {
        match self {
            TagFilter::All => true,
            TagFilter::Tags(tags) => tag.is_some_and(|t| tags.contains(t)),
        }
    }
}

impl Default for TagFilter {
    fn default() -> Self {
        TagFilter::All
    }
}

impl FromStr for TagFilter {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        TagFilter::parse(s)
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagFilter::All => f.write_str("*"),
            TagFilter::Tags(tags) => {
                let joined: Vec<&str> = tags.iter().map(String::as_str).collect();
                f.write_str(&joined.join(" || "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard() {
        for expr in ["*", "", "  *  "] {
            let filter = TagFilter::parse(expr).unwrap();
            assert!(filter.matches(Some("TagA")));
            assert!(filter.matches(None));
        }
    }

    #[test]
    fn test_tag_list() {
        let filter: TagFilter = "TagA || TagC || TagD".parse().unwrap();
        assert!(filter.matches(Some("TagA")));
        assert!(filter.matches(Some("TagD")));
        assert!(!filter.matches(Some("TagB")));
        assert!(!filter.matches(None));
        assert_eq!(filter.to_string(), "TagA || TagC || TagD");
    }

    #[test]
    fn test_single_tag_without_spaces() {
        let filter = TagFilter::parse("TagB").unwrap();
        assert!(filter.matches(Some("TagB")));
        assert!(!filter.matches(Some("TagBB")));
    }

    #[test]
    fn test_malformed() {
        for expr in ["TagA ||", "|| TagA", "TagA || || TagB", "Tag A", "TagA || *"] {
            assert!(
                matches!(TagFilter::parse(expr), Err(ClientError::InvalidFilter(_))),
                "{} should be rejected",
                expr
            );
        }
    }
}
