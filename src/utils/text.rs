use std::borrow::Cow;
use unicode_normalization::UnicodeNormalization;

/// Compatibility-decompose `s` and drop every non-ASCII code point.
///
/// Typographic quotes and dashes have no ASCII decomposition and are
/// removed; accented letters keep their base letter.
#[must_use]
pub fn normalize_to_ascii(s: &str) -> Cow<'_, str> {
    if s.is_ascii() {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.nfkd().filter(char::is_ascii).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_input_is_borrowed() {
        assert!(matches!(normalize_to_ascii("plain text"), Cow::Borrowed(_)));
    }

    #[test]
    fn accents_fold_to_base_letters() {
        assert_eq!(normalize_to_ascii("café naïve"), "cafe naive");
    }

    #[test]
    fn compatibility_forms_decompose() {
        // U+FB01 LATIN SMALL LIGATURE FI, U+2460 CIRCLED DIGIT ONE
        assert_eq!(normalize_to_ascii("\u{FB01}ne \u{2460}"), "fine 1");
    }

    #[test]
    fn typographic_quotes_are_dropped() {
        assert_eq!(normalize_to_ascii("\u{201C}hi\u{201D}"), "hi");
    }
}
