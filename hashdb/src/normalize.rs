//! Basename normalization and fingerprint key derivation (spec section 3).
//!
//! Inventory rows discovered under different paths, casings, track-number
//! prefixes, or mastering-tag suffixes must still collapse onto the same
//! fingerprint key so gossip and local lookups agree. The transformation is
//! pure and deterministic; this module is versioned as a whole — changing the
//! rules below changes every derived key.

use sha2::{Digest, Sha256};

const MASTERING_KEYWORDS: &[&str] = &[
    "remaster",
    "remastered",
    "flac",
    "deluxe",
    "mono",
    "stereo",
    "hi-res",
    "hires",
    "24bit",
    "24-bit",
];

/// Normalizes a (possibly path-qualified) file name into a stable key
/// component: strips directory components, lowercases, strips a leading
/// track-index prefix ("NN " / "NN. "), strips bracketed mastering-variant
/// tags, collapses whitespace, and preserves the extension.
pub fn normalize(name: &str) -> String {
    let basename = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = split_extension(basename);

    let stem = stem.to_lowercase();
    let stem = strip_track_prefix(&stem);
    let stem = strip_bracketed_tags(&stem);
    let stem = collapse_whitespace(&stem);
    let stem = stem.trim();

    match ext {
        Some(ext) => format!("{stem}.{}", ext.to_lowercase()),
        None => stem.to_string(),
    }
}

/// `key = H(normalize(basename) ‖ ":" ‖ size)`.
pub fn fingerprint_key(basename: &str, size: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(basename).as_bytes());
    hasher.update(b":");
    hasher.update(size.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx != 0 => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

fn strip_track_prefix(s: &str) -> String {
    let digit_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if digit_end == 0 {
        return s.to_string();
    }
    let rest = &s[digit_end..];
    if let Some(after_dot) = rest.strip_prefix('.') {
        if after_dot.starts_with(char::is_whitespace) {
            return after_dot.trim_start().to_string();
        }
    }
    if rest.starts_with(char::is_whitespace) {
        return rest.trim_start().to_string();
    }
    s.to_string()
}

fn strip_bracketed_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        let c = s[i..].chars().next().expect("i < s.len()");
        let closing = match c {
            '(' => Some(')'),
            '[' => Some(']'),
            _ => None,
        };
        if let Some(closing) = closing {
            if let Some(rel_end) = s[i..].find(closing) {
                let inner = &s[i + c.len_utf8()..i + rel_end];
                if MASTERING_KEYWORDS
                    .iter()
                    .any(|kw| inner.to_lowercase().contains(kw))
                {
                    i += rel_end + closing.len_utf8();
                    continue;
                }
            }
        }
        out.push(c);
        i += c.len_utf8();
    }
    out
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}
