use lazy_static::lazy_static;
use regex::Regex;

/// Upper bound for the allergies free-text field, counted after trimming.
pub const MAX_ALLERGIES_LEN: usize = 500;

lazy_static! {
    // E.164: leading +, no leading zero, 7-15 digits total.
    static ref E164_RE: Regex = Regex::new(r"^\+[1-9][0-9]{6,14}$").unwrap();
    static ref OTP_RE: Regex = Regex::new(r"^[0-9]{6}$").unwrap();
}

/// Normalize a raw phone number to E.164, or `None` if it cannot be one.
///
/// Accepts common formatting (spaces, dashes, dots, parentheses) and an
/// international `00` prefix in place of `+`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let mut cleaned = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        match c {
            '+' if i == 0 => cleaned.push('+'),
            ' ' | '-' | '.' | '(' | ')' => {}
            c if c.is_ascii_digit() => cleaned.push(c),
            _ => return None,
        }
    }
    let cleaned = match cleaned.strip_prefix("00") {
        Some(rest) => format!("+{rest}"),
        None => cleaned,
    };
    if E164_RE.is_match(&cleaned) {
        Some(cleaned)
    } else {
        None
    }
}

/// An OTP code is exactly 6 ASCII digits.
pub fn is_valid_otp(otp: &str) -> bool {
    OTP_RE.is_match(otp)
}

pub fn is_valid_allergies(text: &str) -> bool {
    text.trim().chars().count() <= MAX_ALLERGIES_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_formatted_numbers() {
        assert_eq!(
            normalize_phone("+358 40 123 4567").as_deref(),
            Some("+358401234567")
        );
        assert_eq!(
            normalize_phone("+1 (555) 123-4567").as_deref(),
            Some("+15551234567")
        );
        assert_eq!(
            normalize_phone("00358401234567").as_deref(),
            Some("+358401234567")
        );
        assert_eq!(normalize_phone("  +447911123456  ").as_deref(), Some("+447911123456"));
    }

    #[test]
    fn rejects_invalid_numbers() {
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("not a number"), None);
        assert_eq!(normalize_phone("12345"), None);
        // missing +, too short once cleaned
        assert_eq!(normalize_phone("+123"), None);
        // leading zero after +
        assert_eq!(normalize_phone("+0123456789"), None);
        // letters mixed in
        assert_eq!(normalize_phone("+35840abc4567"), None);
    }

    #[test]
    fn otp_must_be_exactly_six_digits() {
        assert!(is_valid_otp("123456"));
        assert!(is_valid_otp("000000"));
        assert!(!is_valid_otp("12345"));
        assert!(!is_valid_otp("1234567"));
        assert!(!is_valid_otp("abcdef"));
        assert!(!is_valid_otp("12 456"));
        assert!(!is_valid_otp(""));
    }

    #[test]
    fn allergies_boundary_is_500_after_trim() {
        assert!(is_valid_allergies(""));
        assert!(is_valid_allergies("peanuts"));
        assert!(is_valid_allergies(&"a".repeat(500)));
        assert!(!is_valid_allergies(&"a".repeat(501)));
        // surrounding whitespace does not count
        assert!(is_valid_allergies(&format!("  {}  ", "a".repeat(500))));
    }
}
