//! Text preprocessing for lexical matching.
//!
//! Canonicalizes query and catalog text before fuzzy comparison:
//! 1. Case-fold and apply Unicode NFKC
//! 2. Collapse dash-like characters to `-`
//! 3. Replace anything outside `a-z`, `0-9`, space, `-` and Latin-1/Extended-A with a space
//! 4. Collapse whitespace runs and trim
//!
//! Embedding input is never preprocessed; the model consumes raw text.

use unicode_normalization::UnicodeNormalization;

/// Normalize text for lexical matching.
pub fn normalize(text: &str) -> String {
    let folded = case_fold(text);
    let composed: String = folded.nfkc().collect();

    let cleaned: String = case_fold(&composed)
        .chars()
        .map(|c| {
            let c = if is_dash(c) { '-' } else { c };
            if is_kept(c) {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Full case folding differs from lowercasing for a handful of Latin letters.
fn case_fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'ß' | 'ẞ' => out.push_str("ss"),
            'ſ' => out.push('s'),
            _ => out.extend(c.to_lowercase()),
        }
    }
    out
}

/// Minus sign, hyphen, non-breaking hyphen, figure/en/em dashes and horizontal bar.
fn is_dash(c: char) -> bool {
    c == '\u{2212}' || ('\u{2010}'..='\u{2015}').contains(&c)
}

fn is_kept(c: char) -> bool {
    c.is_ascii_lowercase()
        || c.is_ascii_digit()
        || c == ' '
        || c == '-'
        || ('\u{00C0}'..='\u{017F}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_trims() {
        assert_eq!(normalize("  Vitamin C  "), "vitamin c");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \t\n"), "");
    }

    #[test]
    fn test_dashes_collapse_to_hyphen() {
        assert_eq!(normalize("omega\u{2013}3"), "omega-3");
        assert_eq!(normalize("omega\u{2014}3"), "omega-3");
        assert_eq!(normalize("omega\u{2212}3"), "omega-3");
        assert_eq!(normalize("omega\u{2015}3"), "omega-3");
    }

    #[test]
    fn test_punctuation_becomes_space() {
        assert_eq!(normalize("L-ascorbic acid (E300)"), "l-ascorbic acid e300");
        assert_eq!(normalize("a,b;c"), "a b c");
    }

    #[test]
    fn test_keeps_latin_accents() {
        assert_eq!(normalize("Crème Fraîche"), "crème fraîche");
        assert_eq!(normalize("ŁÓDŹ"), "łódź");
    }

    #[test]
    fn test_compatibility_forms() {
        // fullwidth letters and the "fi" ligature fold to plain ASCII
        assert_eq!(normalize("ＶＩＴＡＭＩＮ"), "vitamin");
        assert_eq!(normalize("ﬁsh oil"), "fish oil");
        assert_eq!(normalize("Straße"), "strasse");
    }

    #[test]
    fn test_strips_non_latin_scripts() {
        assert_eq!(normalize("витамин C"), "c");
        assert_eq!(normalize("维生素 C"), "c");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "Vitamin C",
            "  L-Ascorbic   acid (E300) ",
            "Crème\u{2014}Fraîche",
            "İstanbul",
            "ŉ ĳ ŀ ſ",
            "ＶＩＴＡＭＩＮ ﬁsh",
            "½ tsp ²",
            "Straße ẞ",
            "",
            "--- ---",
            "Ä Ö Ü × ÷",
            "витамин",
        ];

        for sample in samples {
            let once = normalize(sample);
            let twice = normalize(&once);
            assert_eq!(once, twice, "normalize not idempotent for {sample:?}");
        }
    }
}
