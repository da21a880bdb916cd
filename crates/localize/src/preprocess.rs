use crate::lexicon;
use unicode_normalization::UnicodeNormalization;

/// Result of text preprocessing. Corrections never reduce confidence; the
/// count is informational.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessed {
    pub text: String,
    pub corrections: u32,
}

const DIGRAPHS: &[(&str, &str)] = &[
    ("ue", "ü"),
    ("oe", "ö"),
    ("ae", "ä"),
    ("Ue", "Ü"),
    ("Oe", "Ö"),
    ("Ae", "Ä"),
];

/// Normalize to NFKC so Umlauts exist in composed form, then conservatively
/// restore German digraphs (`ue` -> `ü` etc.). A token is only rewritten when
/// the restored form is present in the lexicon; everything else is left
/// untouched. No digit-to-letter substitutions happen here.
pub fn preprocess(input: &str) -> Preprocessed {
    let normalized: String = input.nfkc().collect();

    let mut out = String::with_capacity(normalized.len());
    let mut corrections = 0u32;
    let mut token = String::new();

    for ch in normalized.chars() {
        if ch.is_alphabetic() {
            token.push(ch);
            continue;
        }
        corrections += flush_token(&mut out, &mut token);
        out.push(ch);
    }
    corrections += flush_token(&mut out, &mut token);

    Preprocessed {
        text: out,
        corrections,
    }
}

fn flush_token(out: &mut String, token: &mut String) -> u32 {
    if token.is_empty() {
        return 0;
    }
    let restored = restore_token(token);
    let corrected = match &restored {
        Some(word) => {
            out.push_str(word);
            1
        }
        None => {
            out.push_str(token);
            0
        }
    };
    token.clear();
    corrected
}

/// Restore all digraph occurrences in one token, accepting the rewrite only
/// when the result is a known word.
fn restore_token(token: &str) -> Option<String> {
    if !DIGRAPHS.iter().any(|(from, _)| token.contains(from)) {
        return None;
    }
    let mut candidate = token.to_string();
    for (from, to) in DIGRAPHS {
        candidate = candidate.replace(from, to);
    }
    if candidate != token && lexicon::contains(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// OCR digit restoration for name and address fields only: `3 -> e`,
/// `0 -> o`, `1 -> l`, applied solely to digits embedded in letter runs so
/// house numbers and postal codes survive.
pub fn restore_name_digits(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());

    for (i, &ch) in chars.iter().enumerate() {
        let prev_alpha = i > 0 && chars[i - 1].is_alphabetic();
        let next_alpha = i + 1 < chars.len() && chars[i + 1].is_alphabetic();
        let replacement = match ch {
            '3' if prev_alpha || next_alpha => 'e',
            '0' if prev_alpha || next_alpha => 'o',
            '1' if prev_alpha || next_alpha => 'l',
            other => other,
        };
        out.push(replacement);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn restores_known_digraph_words() {
        let result = preprocess("Sehr geehrte Damen, der Glaeubiger Mueller fordert Zinsen.");
        assert_eq!(
            result.text,
            "Sehr geehrte Damen, der Gläubiger Müller fordert Zinsen."
        );
        assert_eq!(result.corrections, 2);
    }

    #[test]
    fn leaves_unknown_tokens_untouched() {
        // "neue" contains "ue" but "nüe" is no word; "Claudia" contains no digraph.
        let result = preprocess("neue Nachricht von Claudia");
        assert_eq!(result.text, "neue Nachricht von Claudia");
        assert_eq!(result.corrections, 0);
    }

    #[test]
    fn nfkc_composes_combining_umlauts() {
        // u + combining diaeresis composes to u-umlaut.
        let decomposed = "Mu\u{0308}ller";
        let result = preprocess(decomposed);
        assert_eq!(result.text, "Müller");
    }

    #[test]
    fn digit_restoration_only_inside_letter_runs() {
        assert_eq!(restore_name_digits("M3ier"), "Meier");
        assert_eq!(restore_name_digits("K0nrad Str. 12"), "Konrad Str. 12");
        assert_eq!(restore_name_digits("Postfach 10 11"), "Postfach 10 11");
    }

    #[test]
    fn general_text_never_gets_digit_substitution() {
        let result = preprocess("Betrag: 130,50 EUR");
        assert_eq!(result.text, "Betrag: 130,50 EUR");
    }
}
