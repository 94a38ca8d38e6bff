//! String normalization for geography names.

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Normalize a raw name into its matching key.
///
/// - Strips diacritics (NFD decomposition, combining marks dropped)
/// - Converts to lowercase
/// - Spells out `&` as `and`
/// - Turns every other punctuation character into a space
/// - Collapses and trims whitespace
pub fn normalize_name(raw: &str) -> String {
    let stripped: String = raw.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let lowered = stripped.to_lowercase().replace('&', " and ");

    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    WHITESPACE.replace_all(cleaned.trim(), " ").into_owned()
}

/// Human-facing spelling of a raw name: underscores and hyphens become
/// spaces, whitespace is collapsed and every word is title-cased.
pub fn display_name(raw: &str) -> String {
    let spaced = raw.trim().replace(['_', '-'], " ");
    let collapsed = WHITESPACE.replace_all(&spaced, " ");

    let mut out = String::with_capacity(collapsed.len());
    let mut prev_alpha = false;
    for c in collapsed.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Uttar Pradesh "), "uttar pradesh");
        assert_eq!(normalize_name("  UTTAR   pradesh"), "uttar pradesh");
        assert_eq!(normalize_name("Jammu & Kashmir"), "jammu and kashmir");
        assert_eq!(normalize_name("North-East_Delhi"), "north east delhi");
        assert_eq!(normalize_name("Dadra & Nagar Haveli."), "dadra and nagar haveli");
    }

    #[test]
    fn test_normalize_strips_diacritics() {
        assert_eq!(normalize_name("Bāramūla"), "baramula");
        assert_eq!(normalize_name("Śrīnagar"), "srinagar");
    }

    #[test]
    fn test_normalize_empty_and_punctuation_only() {
        assert_eq!(normalize_name("   "), "");
        assert_eq!(normalize_name("?? -- .."), "");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("west_bengal"), "West Bengal");
        assert_eq!(display_name("  NORTH-EAST   delhi "), "North East Delhi");
        assert_eq!(display_name("jammu and kashmir"), "Jammu And Kashmir");
    }
}
