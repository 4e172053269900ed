//! Small string helpers shared by site integrations and log output.

/// Shorten `text` to `limit` characters, appending `...` when cut.
pub fn limit_text(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// Keep at most `max` characters of `text`.
pub fn clamp_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text,
    }
}

/// Catalog view URL slug: keep alphanumerics and spaces, join words with
/// `-`, lowercase.
pub fn slugify(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .map(|c| if c == ' ' { '-' } else { c.to_ascii_lowercase() })
        .collect()
}

/// Plain-text short description derived from free text.
///
/// Drops everything except ASCII alphanumerics, whitespace and `_/-.`,
/// collapses repeated punctuation, and trims. Returns `None` when fewer
/// than `min` characters remain.
pub fn short_description(text: &str, min: usize) -> Option<String> {
    let kept = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || "_/-.".contains(*c));

    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    for c in kept {
        let punct = !c.is_ascii_alphanumeric() && !c.is_whitespace();
        if punct && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }

    let trimmed = out.trim();
    (trimmed.chars().count() >= min).then(|| trimmed.to_string())
}
