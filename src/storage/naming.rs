/// Deterministic ASCII storage keys
///
/// Listing file keys look like
/// `{grade}_{subject}_{category}_{pages}p_{shortid}_{timestamp_ms}.{ext}`.
/// Free-text segments are slugged so keys never contain non-ASCII text.

/// Maximum characters kept from one free-text segment
const SEGMENT_MAX: usize = 24;

/// ASCII slug of a free-text segment.
///
/// ASCII letters and digits are kept (lowercased); any other character
/// becomes its code point in hex, so distinct Hangul labels stay distinct.
pub fn slug(text: &str) -> String {
    let mut out = String::new();
    for c in text.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '_' || c == '-' {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
        } else {
            out.push_str(&format!("{:x}", c as u32));
        }
    }

    let trimmed: String = out.trim_matches('-').chars().take(SEGMENT_MAX).collect();
    if trimmed.is_empty() {
        "x".to_string()
    } else {
        trimmed
    }
}

/// First 8 alphanumeric characters of an account id
pub fn short_id(account_id: &str) -> String {
    let id: String = account_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_lowercase();
    if id.is_empty() {
        "anon".to_string()
    } else {
        id
    }
}

/// Key for a listing source file
pub fn listing_file_key(
    grade: &str,
    subject: &str,
    category: &str,
    page_count: i64,
    account_id: &str,
    timestamp_ms: i64,
    extension: &str,
) -> String {
    format!(
        "{}_{}_{}_{}p_{}_{}.{}",
        slug(grade),
        slug(subject),
        slug(category),
        page_count.max(1),
        short_id(account_id),
        timestamp_ms,
        extension
    )
}

/// Key for a preview image
pub fn preview_key(account_id: &str, timestamp_ms: i64, nonce: u32, extension: &str) -> String {
    format!(
        "preview_{}_{}_{:08x}.{}",
        short_id(account_id),
        timestamp_ms,
        nonce,
        extension
    )
}
