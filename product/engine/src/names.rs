use regex::Regex;
use std::sync::OnceLock;

/// Token used when a search term has nothing usable left after cleaning.
pub const FALLBACK_NAME: &str = "query";
// Leaves room for ".zip" under the common 255-byte file name limit.
const MAX_FILE_STEM_BYTES: usize = 200;

static DISALLOWED_RE: OnceLock<Regex> = OnceLock::new();
static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

/// Turns free text into something usable both as a search keyword and as a
/// file stem. Never returns an empty string.
pub fn safe_name(raw: &str) -> String {
    let cleaned = clean_query(raw);
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}

/// File name for the archive built from `keyword`: `{safe_name}.zip`, with
/// the stem cut at a character boundary when it would not fit on disk.
pub fn archive_file_name(keyword: &str) -> String {
    let name = safe_name(keyword);
    let mut end = name.len().min(MAX_FILE_STEM_BYTES);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}.zip", name[..end].trim())
}

/// Same cleaning as [`safe_name`] without the fallback, so callers can tell
/// an unusable term apart from one that legitimately reads "query".
pub fn clean_query(raw: &str) -> String {
    let disallowed =
        DISALLOWED_RE.get_or_init(|| Regex::new(r"[^\w\s-]").expect("disallowed chars regex"));
    let whitespace = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));

    let stripped = disallowed.replace_all(raw.trim(), "");
    whitespace.replace_all(&stripped, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_name_strips_punctuation_and_collapses_spaces() {
        assert_eq!(safe_name("  skin   stapler!! "), "skin stapler");
        assert_eq!(safe_name("a/b\\c:d*e?"), "abcde");
        assert_eq!(safe_name("tab\tand\nnewline"), "tab and newline");
    }

    #[test]
    fn safe_name_keeps_hyphen_underscore_and_unicode_letters() {
        assert_eq!(safe_name("x-ray_image"), "x-ray_image");
        assert_eq!(safe_name("café crème"), "café crème");
        assert_eq!(safe_name("عکس گربه"), "عکس گربه");
    }

    #[test]
    fn safe_name_falls_back_when_everything_is_stripped() {
        assert_eq!(safe_name(""), FALLBACK_NAME);
        assert_eq!(safe_name("   "), FALLBACK_NAME);
        assert_eq!(safe_name("!@#$%^&*()"), FALLBACK_NAME);
    }

    #[test]
    fn safe_name_is_never_empty() {
        for raw in ["", " ", "...", "\u{200b}", "a", "🙂🙂", "--"] {
            assert!(!safe_name(raw).is_empty(), "raw={raw:?}");
        }
    }

    #[test]
    fn archive_file_name_uses_sanitized_term_and_caps_length() {
        assert_eq!(archive_file_name("skin stapler?"), "skin stapler.zip");
        assert_eq!(archive_file_name(""), "query.zip");
        let ordinary = "a".repeat(150);
        assert_eq!(archive_file_name(&ordinary), format!("{ordinary}.zip"));
        let long = "a".repeat(500);
        assert_eq!(archive_file_name(&long).len(), MAX_FILE_STEM_BYTES + 4);
    }

    #[test]
    fn archive_file_name_cut_respects_multibyte_letters() {
        // 2-byte then 3-byte letters; byte 200 falls inside a letter.
        let long = "ع".repeat(80) + &"한".repeat(80);
        let name = archive_file_name(&long);
        assert!(name.ends_with(".zip"));
        assert!(name.len() <= MAX_FILE_STEM_BYTES + 4);
        assert!(long.starts_with(name.trim_end_matches(".zip")));
    }

    #[test]
    fn clean_query_reports_empty_for_unusable_terms() {
        assert_eq!(clean_query("?!"), "");
        assert_eq!(clean_query("query"), "query");
    }
}
