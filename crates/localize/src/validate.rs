/// Field validators. A failed validation flags the value for review; callers
/// never null the field on failure.

lazy_static::lazy_static! {
    static ref NAME: regex::Regex =
        regex::Regex::new(r"^[\p{L}][\p{L} .'\-]*[\p{L}.]$").unwrap();
}

/// German postal codes are exactly five decimal digits.
pub fn validate_postal_code(value: &str) -> bool {
    let v = value.trim();
    v.len() == 5 && v.chars().all(|c| c.is_ascii_digit())
}

/// Person or company names: Unicode letters including Umlauts, noble
/// prefixes (von, zu, de, ...), hyphens and apostrophes, 2..=80 codepoints.
pub fn validate_name(value: &str) -> bool {
    let v = value.trim();
    let count = v.chars().count();
    (2..=80).contains(&count) && NAME.is_match(v)
}

/// Street addresses are free-form but must carry a numeric component.
pub fn validate_street_address(value: &str) -> bool {
    let v = value.trim();
    !v.is_empty()
        && v.chars().any(|c| c.is_ascii_digit())
        && v.chars().any(|c| c.is_alphabetic())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn postal_codes() {
        assert!(validate_postal_code("80331"));
        assert!(validate_postal_code(" 04109 "));
        assert!(!validate_postal_code("8033"));
        assert!(!validate_postal_code("803312"));
        assert!(!validate_postal_code("8O331"));
    }

    #[test]
    fn names_accept_umlauts_and_noble_prefixes() {
        assert!(validate_name("Jürgen Müller"));
        assert!(validate_name("Anna-Lena von der Heide"));
        assert!(validate_name("O'Connor"));
        assert!(validate_name("Freiherr zu Guttenberg"));
        assert!(validate_name("Inkasso Büro Köhler GmbH."));
    }

    #[test]
    fn names_reject_garbage() {
        assert!(!validate_name("X"));
        assert!(!validate_name("12345"));
        assert!(!validate_name(""));
        let too_long = "a".repeat(81);
        assert!(!validate_name(&too_long));
    }

    #[test]
    fn street_addresses_need_a_number() {
        assert!(validate_street_address("Hauptstraße 12"));
        assert!(validate_street_address("Am Bach 3a"));
        assert!(!validate_street_address("Hauptstraße"));
        assert!(!validate_street_address(""));
    }
}
