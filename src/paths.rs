//! URL path decoding and root-confined normalisation.

use std::path::PathBuf;

/// Decode `%XX` escapes in a request or fetch path.
///
/// Fails on a truncated or non-hex escape, or when the decoded bytes are not
/// UTF-8.
pub fn percent_decode(encoded: &str) -> Result<String, ()> {
    let mut out = Vec::with_capacity(encoded.len());
    let mut bytes = encoded.bytes();
    while let Some(b) = bytes.next() {
        if b != b'%' {
            out.push(b);
            continue;
        }
        let hi = bytes.next().and_then(hex_value).ok_or(())?;
        let lo = bytes.next().and_then(hex_value).ok_or(())?;
        out.push(hi << 4 | lo);
    }
    String::from_utf8(out).map_err(|_| ())
}

fn hex_value(b: u8) -> Option<u8> {
    char::from(b).to_digit(16).map(|d| d as u8)
}

/// Normalise a `/`-separated path, dropping empty and `.` components and
/// resolving `..` by popping.
///
/// Returns `None` when a `..` would climb above the starting point.
pub fn normalize_path(decoded: &str) -> Option<PathBuf> {
    normalize_components(&[], decoded).map(|parts| parts.iter().collect())
}

/// Like [`normalize_path`], but starting from the components in `base`.
///
/// `fetch("../shared.md")` from page directory `guide` yields `shared.md`;
/// climbing above `base`'s own root still fails.
pub fn normalize_from(base: &[String], relative: &str) -> Option<PathBuf> {
    normalize_components(base, relative).map(|parts| parts.iter().collect())
}

fn normalize_components(base: &[String], path: &str) -> Option<Vec<String>> {
    let mut parts: Vec<String> = base.to_vec();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            name => parts.push(name.to_owned()),
        }
    }
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_plain_ascii() {
        assert_eq!(percent_decode("/docs/guide").unwrap(), "/docs/guide");
    }

    #[test]
    fn decode_dot_dot_both_cases() {
        assert_eq!(percent_decode("%2e%2e").unwrap(), "..");
        assert_eq!(percent_decode("%2E%2E").unwrap(), "..");
    }

    #[test]
    fn decode_encoded_space() {
        assert_eq!(percent_decode("/a%20b.md").unwrap(), "/a b.md");
    }

    #[test]
    fn decode_truncated_sequence_is_error() {
        assert!(percent_decode("%2").is_err());
        assert!(percent_decode("%").is_err());
    }

    #[test]
    fn decode_invalid_hex_is_error() {
        assert!(percent_decode("%zz").is_err());
    }

    #[test]
    fn decode_invalid_utf8_sequence_is_error() {
        // %80 is a lone continuation byte.
        assert!(percent_decode("%80").is_err());
    }

    #[test]
    fn normalize_simple_path() {
        assert_eq!(normalize_path("/docs/guide").unwrap(), PathBuf::from("docs/guide"));
    }

    #[test]
    fn normalize_root_gives_empty() {
        assert_eq!(normalize_path("/").unwrap(), PathBuf::new());
    }

    #[test]
    fn normalize_dot_and_dotdot_within_root() {
        assert_eq!(normalize_path("/a/./b").unwrap(), PathBuf::from("a/b"));
        assert_eq!(normalize_path("/a/b/../c").unwrap(), PathBuf::from("a/c"));
    }

    #[test]
    fn normalize_traversal_above_root_rejected() {
        assert!(normalize_path("/../etc/passwd").is_none());
        assert!(normalize_path("/a/../../etc/passwd").is_none());
    }

    #[test]
    fn normalize_encoded_dotdot_after_decode() {
        let decoded = percent_decode("/%2e%2e%2fetc%2fpasswd").unwrap();
        assert!(normalize_path(&decoded).is_none());
    }

    #[test]
    fn normalize_from_base_allows_climbing_to_root() {
        let base = vec!["guide".to_owned()];
        assert_eq!(normalize_from(&base, "../shared.md").unwrap(), PathBuf::from("shared.md"));
        assert_eq!(normalize_from(&base, "part/a.md").unwrap(), PathBuf::from("guide/part/a.md"));
        assert!(normalize_from(&base, "../../x.md").is_none());
    }
}
