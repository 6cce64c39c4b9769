use std::collections::HashMap;

/// Per-session CURIE table populated by PREFIX messages.
///
/// ```
/// use courier_wire::PrefixTable;
///
/// let mut table = PrefixTable::new();
/// table.register("calc", "http://example.com/simple/calc#");
/// assert_eq!(table.expand("calc:square"), "http://example.com/simple/calc#square");
/// assert_eq!(table.expand("other:square"), "other:square");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixTable {
    prefixes: HashMap<String, String>,
}

impl PrefixTable {
    pub fn new() -> Self {
        Self::default()
    }

    // Later registrations for the same prefix replace earlier ones.
    pub fn register(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return;
        }
        self.prefixes.insert(prefix, uri.into());
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Expands `prefix:suffix` when `prefix` is registered; anything else is
    /// returned unchanged.
    pub fn expand(&self, uri: &str) -> String {
        if let Some((prefix, suffix)) = uri.split_once(':')
            && let Some(base) = self.prefixes.get(prefix)
        {
            let mut expanded = String::with_capacity(base.len() + suffix.len());
            expanded.push_str(base);
            expanded.push_str(suffix);
            return expanded;
        }
        uri.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_uris_are_left_alone() {
        let mut table = PrefixTable::new();
        table.register("event", "http://example.com/event#");
        assert_eq!(
            table.expand("http://example.com/event#a"),
            "http://example.com/event#a"
        );
        assert_eq!(table.expand("/topic/plain"), "/topic/plain");
    }

    #[test]
    fn only_first_colon_splits() {
        let mut table = PrefixTable::new();
        table.register("t", "/topic/");
        assert_eq!(table.expand("t:a:b"), "/topic/a:b");
    }

    #[test]
    fn empty_prefix_is_ignored() {
        let mut table = PrefixTable::new();
        table.register("", "/topic/");
        assert!(table.is_empty());
        assert_eq!(table.expand(":x"), ":x");
    }

    #[test]
    fn re_register_replaces() {
        let mut table = PrefixTable::new();
        table.register("t", "/a/");
        table.register("t", "/b/");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("t"), Some("/b/"));
        assert_eq!(table.expand("t:x"), "/b/x");
    }
}
