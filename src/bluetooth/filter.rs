//! Name allow-list for device candidates
//!
//! The same patterns are used twice: pushed down into the inventory query as
//! `LIKE` clauses so the expensive per-device step only sees plausible
//! devices, and applied locally to whatever the query returned.

/// Case-insensitive "name contains any of" filter
#[derive(Debug, Clone)]
pub struct NameFilter {
    /// Lower-cased patterns
    patterns: Vec<String>,
    /// Patterns as configured, for the query
    original: Vec<String>,
}

impl NameFilter {
    /// Create a new name filter
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let original: Vec<String> = patterns.into_iter().map(Into::into).collect();
        Self {
            patterns: original.iter().map(|p| p.to_lowercase()).collect(),
            original,
        }
    }

    /// Check if a device name passes the filter
    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.patterns.iter().any(|p| name.contains(p.as_str()))
    }

    /// WQL condition selecting healthy entities whose name matches any pattern
    pub fn wql_condition(&self) -> String {
        let clauses = self
            .original
            .iter()
            .map(|p| format!("Name LIKE '%{}%'", p.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("Status='OK' AND ({})", clauses)
    }
}
