//! Field tag helpers.

/// Tags consulted when the caller supplies none, highest priority first.
pub const DEFAULT_PRIORITY_TAGS: &[&str] = &["conv", "param", "params", "c", "p", "json"];

/// Value of tag `key` in a field's tag list.
pub fn lookup<'a>(tags: &[(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    tags.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Name part of a raw tag value: everything before the first `,`, trimmed.
///
/// `"user_name,omitempty"` → `Some("user_name")`, `" ,omitempty"` → `None`.
pub fn primary_name(raw: &str) -> Option<&str> {
    raw.split(',').next().map(str::trim).filter(|name| !name.is_empty())
}

/// Split a comma-separated tag priority string such as `"orm, json"`.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

/// Strip every character that is not a letter or digit.
pub fn remove_symbols(name: &str) -> String {
    name.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Key used for fuzzy comparison: symbols removed, lowercased.
pub fn fuzzy_key(name: &str) -> String {
    remove_symbols(name).to_lowercase()
}
