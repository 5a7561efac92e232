//! Ranked Mobius server lists.

use std::collections::HashSet;

/// Primary and backup Mobius servers, highest priority first.
///
/// Supplied once by discovery and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MobiusServers {
    primary: Vec<String>,
    backup: Vec<String>,
}

impl MobiusServers {
    /// Build the server set.
    ///
    /// Empty entries are skipped and duplicates dropped (first occurrence
    /// wins). A backup entry that is also a primary entry is dropped from the
    /// backup list. Trailing slashes are ignored when comparing.
    #[must_use]
    pub fn new<P, B>(primary: P, backup: B) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        let mut seen = HashSet::new();
        let primary = dedupe(primary, &mut seen);
        let backup = dedupe(backup, &mut seen);
        Self { primary, backup }
    }

    #[must_use]
    pub fn primary(&self) -> &[String] {
        &self.primary
    }

    #[must_use]
    pub fn backup(&self) -> &[String] {
        &self.backup
    }

    /// Whether `url` is one of the primary servers.
    #[must_use]
    pub fn is_primary(&self, url: &str) -> bool {
        self.primary.iter().any(|p| same_server(p, url))
    }

    /// The configured entry matching `url`, searching primary then backup.
    #[must_use]
    pub fn find(&self, url: &str) -> Option<&str> {
        self.primary
            .iter()
            .chain(self.backup.iter())
            .find(|candidate| same_server(candidate, url))
            .map(String::as_str)
    }
}

fn dedupe<I>(urls: I, seen: &mut HashSet<String>) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    urls.into_iter()
        .map(Into::into)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .filter(|url| seen.insert(normalize(url).to_string()))
        .collect()
}

fn normalize(url: &str) -> &str {
    url.trim_end_matches('/')
}

fn same_server(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_dropped() {
        let servers = MobiusServers::new(
            ["https://p1/", "https://p2/", "https://p1"],
            ["https://b1/", "https://p2/", "https://b1/", ""],
        );

        assert_eq!(servers.primary(), ["https://p1/", "https://p2/"]);
        assert_eq!(servers.backup(), ["https://b1/"]);
    }

    #[test]
    fn test_is_primary_ignores_trailing_slash() {
        let servers = MobiusServers::new(["https://p1/"], ["https://b1/"]);
        assert!(servers.is_primary("https://p1"));
        assert!(!servers.is_primary("https://b1/"));
    }

    #[test]
    fn test_find_returns_configured_entry() {
        let servers = MobiusServers::new(["https://p1/"], ["https://b1/"]);
        assert_eq!(servers.find("https://b1"), Some("https://b1/"));
        assert_eq!(servers.find("https://other/"), None);
    }
}
