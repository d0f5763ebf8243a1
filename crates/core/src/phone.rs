//! Phone number normalisation for SMS and WhatsApp dispatch.

/// National subscriber numbers are nine digits; anything already carrying the
/// country code in front of that many digits is treated as normalised.
const SUBSCRIBER_DIGITS: usize = 9;

/// Canonical international form without a leading `+`.
///
/// * whitespace is stripped
/// * a leading trunk `0` is replaced by the country code
/// * a leading `+` is dropped
/// * numbers already prefixed with the country code are left alone
/// * anything else gets the country code prepended
pub fn normalize(phone: &str, country_code: &str) -> String {
    let code = country_code.trim().trim_start_matches('+');
    let mobile: String = phone.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(rest) = mobile.strip_prefix('0') {
        format!("{}{}", code, rest)
    } else if let Some(rest) = mobile.strip_prefix('+') {
        rest.to_string()
    } else if !code.is_empty()
        && mobile.starts_with(code)
        && mobile.len() >= code.len() + SUBSCRIBER_DIGITS
    {
        mobile
    } else {
        format!("{}{}", code, mobile)
    }
}

/// A normalised number is non-empty and digits only.
pub fn is_dialable(normalized: &str) -> bool {
    !normalized.is_empty() && normalized.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trunk_zero_replaced_by_country_code() {
        assert_eq!(normalize("0712345678", "254"), "254712345678");
    }

    #[test]
    fn test_leading_plus_stripped() {
        assert_eq!(normalize("+254712345678", "254"), "254712345678");
    }

    #[test]
    fn test_bare_subscriber_number_gets_country_code() {
        assert_eq!(normalize("712345678", "254"), "254712345678");
    }

    #[test]
    fn test_whitespace_removed() {
        assert_eq!(normalize(" 0712 345 678 ", "254"), "254712345678");
    }

    #[test]
    fn test_country_code_with_plus() {
        assert_eq!(normalize("0712345678", "+254"), "254712345678");
    }

    #[test]
    fn test_idempotent_on_normalized_numbers() {
        for raw in ["0712345678", "+254712345678", "712345678", "254712345678"] {
            let once = normalize(raw, "254");
            assert_eq!(normalize(&once, "254"), once, "input {raw}");
        }
    }

    #[test]
    fn test_is_dialable() {
        assert!(is_dialable("254712345678"));
        assert!(!is_dialable("254-712"));
        assert!(!is_dialable(""));
    }
}
