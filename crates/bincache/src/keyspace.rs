//! Key naming for cache bins
//!
//! Every bin owns a namespace `{prefix}:{bin}` (or just `{bin}`). Entries
//! live under `{ns}:{id}`, so the full-bin pattern `{ns}:*` never touches a
//! sibling bin whose name merely starts with this one (`cache` vs
//! `cache_page`).
//!
//! Bin names and key prefixes may not contain the separator, which makes
//! the first segment of every entry key non-empty. Flush floor records live
//! under `:flush:{ns}`, whose first segment is empty, so no entry key, id or
//! prefix pattern of any bin can reach them.

/// Separator between key segments
pub const SEPARATOR: char = ':';

/// Leading segment of every flush floor record
pub const FLUSH_KEY_PREFIX: &str = ":flush:";

/// Check that a bin name or key prefix can be used as a key segment
pub fn validate_segment(kind: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{kind} must not be empty"));
    }
    if value.contains(SEPARATOR) {
        return Err(format!("{kind} '{value}' must not contain '{SEPARATOR}'"));
    }
    if value.contains(|c: char| c.is_whitespace() || c.is_control()) {
        return Err(format!(
            "{kind} '{}' must not contain whitespace or control characters",
            value.escape_debug()
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    /// `key_prefix` is the optional site-wide prefix shared by all bins
    pub fn new(key_prefix: Option<&str>, bin: &str) -> Self {
        let namespace = match key_prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{bin}"),
            _ => bin.to_string(),
        };
        Self { namespace }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn entry_key(&self, id: &str) -> String {
        format!("{}:{id}", self.namespace)
    }

    pub fn entry_keys<'a, I>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter().map(|id| self.entry_key(id)).collect()
    }

    pub fn flush_key(&self) -> String {
        format!("{FLUSH_KEY_PREFIX}{}", self.namespace)
    }

    /// Literal key prefix matching every entry id starting with `id_prefix`
    ///
    /// The store adapter is responsible for turning this into a match
    /// pattern; see [`glob_pattern`].
    pub fn prefix(&self, id_prefix: &str) -> String {
        self.entry_key(id_prefix)
    }

    /// Literal key prefix matching every entry of the bin
    pub fn all_entries_prefix(&self) -> String {
        self.prefix("")
    }
}

/// Escape glob metacharacters so `prefix` matches literally, then append `*`
pub fn glob_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 8);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}
