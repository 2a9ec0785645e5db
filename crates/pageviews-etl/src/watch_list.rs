//! The fixed set of article titles a run tracks

use std::collections::BTreeSet;
use std::str::FromStr;

/// Titles tracked when no watch-list is configured
pub const DEFAULT_WATCH_LIST: [&str; 5] = ["Amazon", "Apple", "Facebook", "Google", "Microsoft"];

/// Immutable set of canonical article titles.
///
/// Titles are stored in the dump's own convention (underscores instead of
/// spaces), so `"Apple Inc."` matches the dump title `Apple_Inc.`. Matching is
/// exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchList {
    titles: BTreeSet<String>,
}

impl WatchList {
    pub fn new<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let titles = titles
            .into_iter()
            .map(|title| normalize_title(title.as_ref()))
            .filter(|title| !title.is_empty())
            .collect();
        Self { titles }
    }

    pub fn contains(&self, page_title: &str) -> bool {
        self.titles.contains(page_title)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Titles in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.titles.iter().map(String::as_str)
    }
}

impl Default for WatchList {
    fn default() -> Self {
        Self::new(DEFAULT_WATCH_LIST)
    }
}

/// Comma-separated titles, e.g. `Amazon,Apple Inc.,Google`
impl FromStr for WatchList {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.split(',')))
    }
}

impl std::fmt::Display for WatchList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

fn normalize_title(title: &str) -> String {
    title.trim().replace(' ', "_")
}
