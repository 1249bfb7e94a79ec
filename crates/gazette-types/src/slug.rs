use unicode_normalization::UnicodeNormalization;

/// Turn a title into a URL-safe slug.
///
/// Decomposes to NFKD first so accented letters keep their base letter, then
/// lowercases, drops everything that is not an ASCII letter, digit, `_`, `-`
/// or whitespace, then collapses runs of whitespace and `-` into one `-`.
/// Leading and trailing `-`/`_` are stripped.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.nfkd() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch == '-' || ch.is_whitespace() {
            pending_dash = true;
        }
    }

    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}
