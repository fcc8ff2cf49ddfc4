//! Recipient and identifier helpers

use regex::Regex;
use std::sync::LazyLock;

static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\+254|254|0)?((?:7[0-9]{8})|(?:1[01][0-9]{7}))$")
        .expect("PHONE_REGEX is a compile-time constant")
});

static ADDRESS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("ADDRESS_REGEX is a compile-time constant"));

static ALIAS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+$").expect("ALIAS_REGEX is a compile-time constant")
});

static YEAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}$").expect("YEAR_REGEX is a compile-time constant"));

static AMOUNT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("AMOUNT_REGEX is a compile-time constant"));

/// What a recipient string refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientKind {
    /// Kenyan mobile number
    PhoneNumber,
    /// `0x` account address
    Address,
    /// `name@domain` alias
    Alias,
}

/// Classify a recipient, `None` when it matches no accepted form
pub fn check_recipient(recipient: &str) -> Option<RecipientKind> {
    if PHONE_REGEX.is_match(recipient) {
        Some(RecipientKind::PhoneNumber)
    } else if ADDRESS_REGEX.is_match(recipient) {
        Some(RecipientKind::Address)
    } else if ALIAS_REGEX.is_match(recipient) {
        Some(RecipientKind::Alias)
    } else {
        None
    }
}

/// Rewrite a phone number to the `254XXXXXXXXX` form session ids use
pub fn normalize_phone(number: &str) -> Option<String> {
    PHONE_REGEX
        .captures(number.trim())
        .and_then(|caps| caps.get(1))
        .map(|local| format!("254{}", local.as_str()))
}

/// Lowercase hex with a `0x` prefix
pub fn normalize_hex(value: &str) -> Option<String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", digits.to_ascii_lowercase()))
}

/// Exactly four ASCII digits
pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == 4 && pin.bytes().all(|b| b.is_ascii_digit())
}

/// Four-digit year
pub fn is_valid_year(year: &str) -> bool {
    YEAR_REGEX.is_match(year)
}

/// Positive decimal amount
pub fn parse_amount(amount: &str) -> Option<f64> {
    if !AMOUNT_REGEX.is_match(amount) {
        return None;
    }
    amount.parse::<f64>().ok().filter(|value| *value > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_recipient() {
        assert_eq!(check_recipient("0712345678"), Some(RecipientKind::PhoneNumber));
        assert_eq!(check_recipient("+254712345678"), Some(RecipientKind::PhoneNumber));
        assert_eq!(check_recipient("0110123456"), Some(RecipientKind::PhoneNumber));
        assert_eq!(
            check_recipient("0xd4c288865Ce0985a481Eef3be02443dF5E2e4Ea9"),
            Some(RecipientKind::Address)
        );
        assert_eq!(check_recipient("alice@sarafu"), Some(RecipientKind::Alias));
        assert_eq!(check_recipient("000"), None);
        assert_eq!(check_recipient("0705X2"), None);
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("0712345678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_phone("+254712345678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_phone("712345678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_phone("12345"), None);
    }

    #[test]
    fn test_normalize_hex() {
        assert_eq!(normalize_hex("0xD3adB33f").as_deref(), Some("0xd3adb33f"));
        assert_eq!(normalize_hex("0XABC").as_deref(), Some("0xabc"));
        assert_eq!(normalize_hex("abc").as_deref(), Some("0xabc"));
        assert_eq!(normalize_hex("0x"), None);
        assert_eq!(normalize_hex("0xzz"), None);
    }

    #[test]
    fn test_pin_and_year() {
        assert!(is_valid_pin("1234"));
        assert!(!is_valid_pin("123"));
        assert!(!is_valid_pin("12345"));
        assert!(!is_valid_pin("12a4"));
        assert!(!is_valid_pin("１２３４"));

        assert!(is_valid_year("1980"));
        assert!(!is_valid_year("123"));
        assert!(!is_valid_year("sgahaha"));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("4.10"), Some(4.10));
        assert_eq!(parse_amount("5"), Some(5.0));
        assert_eq!(parse_amount("0"), None);
        assert_eq!(parse_amount("0.02ms"), None);
        assert_eq!(parse_amount("-1"), None);
    }
}
