//! Event masks select which `type.action` pairs an endpoint receives.

use serde::{Deserialize, Serialize};

/// A list of patterns, each one of:
/// - `*` accepts every event
/// - `<type>.*` accepts every action of a type
/// - `<type>.<action>` accepts exactly one pair
///
/// An empty mask accepts everything. No other wildcard forms are recognised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventMask(Vec<String>);

impl EventMask {
    /// Creates a mask from patterns.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(patterns.into_iter().map(Into::into).collect())
    }

    /// A mask accepting every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parses a comma-separated list, ignoring blanks.
    pub fn parse_list(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty()),
        )
    }

    pub fn patterns(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if the mask accepts the event type/action pair.
    pub fn matches(&self, event_type: &str, action: &str) -> bool {
        if self.0.is_empty() {
            return true;
        }
        self.0
            .iter()
            .any(|pattern| pattern_matches(pattern, event_type, action))
    }
}

fn pattern_matches(pattern: &str, event_type: &str, action: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let key = format!("{event_type}.{action}");
    match pattern.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('.') => key.starts_with(prefix),
        Some(_) => false,
        None => key == pattern,
    }
}
