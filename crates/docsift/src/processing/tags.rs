//! Tag normalization

/// Trim, drop a leading `#`, dedupe case-insensitively keeping the first
/// spelling, and keep at most `limit` tags in their original order.
pub fn normalize_tags<I, S>(raw: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut tags = Vec::new();

    for tag in raw {
        if tags.len() >= limit {
            break;
        }
        let tag = tag.as_ref().trim().trim_start_matches('#').trim();
        if tag.is_empty() {
            continue;
        }
        if seen.insert(tag.to_lowercase()) {
            tags.push(tag.to_string());
        }
    }

    tags
}
