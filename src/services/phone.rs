//! Phone number helpers
//!
//! Numbers are stored in E.164 form (`+15551234567`). North American
//! numbers without a country code get `+1`.

/// Normalize a phone number to E.164.
///
/// - non-digits are stripped
/// - 10 digits become `+1XXXXXXXXXX`
/// - 11 digits starting with `1` become `+1XXXXXXXXXX`
/// - anything else becomes `+digits`
///
/// Returns `None` when the input has no digits at all.
pub fn normalize_phone_number(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    if input.trim_start().starts_with('+') {
        return Some(format!("+{}", digits));
    }

    // An 11-digit number with a leading 1 already carries its country code
    if digits.len() == 10 {
        Some(format!("+1{}", digits))
    } else {
        Some(format!("+{}", digits))
    }
}

/// Format a North American number as `(XXX) XXX-XXXX`; other numbers are
/// returned unchanged.
pub fn format_phone_number(input: &str) -> String {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    let local = match digits.len() {
        10 => &digits[..],
        11 if digits.starts_with('1') => &digits[1..],
        _ => return input.to_string(),
    };
    format!("({}) {}-{}", &local[..3], &local[3..6], &local[6..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_ten_digits() {
        assert_eq!(
            normalize_phone_number("(555) 123-4567").as_deref(),
            Some("+15551234567")
        );
    }

    #[test]
    fn test_normalize_eleven_digits_with_one() {
        assert_eq!(
            normalize_phone_number("1-555-123-4567").as_deref(),
            Some("+15551234567")
        );
    }

    #[test]
    fn test_normalize_keeps_international() {
        assert_eq!(
            normalize_phone_number("+44 20 7946 0958").as_deref(),
            Some("+442079460958")
        );
        assert_eq!(normalize_phone_number("4420794609").as_deref(), Some("+14420794609"));
        assert_eq!(normalize_phone_number("123456").as_deref(), Some("+123456"));
    }

    #[test]
    fn test_normalize_rejects_no_digits() {
        assert!(normalize_phone_number("").is_none());
        assert!(normalize_phone_number("call me").is_none());
    }

    #[test]
    fn test_format() {
        assert_eq!(format_phone_number("+15551234567"), "(555) 123-4567");
        assert_eq!(format_phone_number("5551234567"), "(555) 123-4567");
        assert_eq!(format_phone_number("+442079460958"), "+442079460958");
    }

    proptest! {
        #[test]
        fn prop_normalized_is_plus_digits(input in "[0-9 ()+-]{0,20}") {
            if let Some(normalized) = normalize_phone_number(&input) {
                prop_assert!(normalized.starts_with('+'));
                prop_assert!(normalized[1..].chars().all(|c| c.is_ascii_digit()));
            }
        }

        #[test]
        fn prop_normalize_is_idempotent(digits in "[0-9]{1,15}") {
            let once = normalize_phone_number(&digits).unwrap();
            let twice = normalize_phone_number(&once).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_ten_digits_get_country_code(digits in "[0-9]{10}") {
            let normalized = normalize_phone_number(&digits).unwrap();
            prop_assert_eq!(normalized, format!("+1{}", digits));
        }
    }
}
