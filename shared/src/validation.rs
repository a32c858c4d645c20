//! Validation utilities for the Fleet Management Platform

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

// ============================================================================
// Vehicle Validations
// ============================================================================

/// Normalise a registration plate: uppercase, no whitespace or dashes
pub fn normalize_registration(registration: &str) -> String {
    registration
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Validate a (normalised) registration plate: 2-10 uppercase alphanumerics
pub fn validate_registration(registration: &str) -> Result<(), &'static str> {
    let normalized = normalize_registration(registration);
    if normalized.len() < 2 || normalized.len() > 10 {
        return Err("Registration must be 2-10 characters");
    }
    if !normalized
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err("Registration must be letters and digits only");
    }
    Ok(())
}

/// Validate a VIN: 17 characters, letters and digits except I, O and Q
pub fn validate_vin(vin: &str) -> Result<(), &'static str> {
    let vin = vin.trim();
    if vin.len() != 17 {
        return Err("VIN must be exactly 17 characters");
    }
    if !vin.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("VIN must be letters and digits only");
    }
    if vin
        .chars()
        .any(|c| matches!(c.to_ascii_uppercase(), 'I' | 'O' | 'Q'))
    {
        return Err("VIN cannot contain I, O or Q");
    }
    Ok(())
}

/// Validate a model year against the reference date (next year's models allowed)
pub fn validate_vehicle_year(year: i32, today: NaiveDate) -> Result<(), &'static str> {
    if year < 1900 || year > today.year() + 1 {
        return Err("Year is out of range");
    }
    Ok(())
}

/// Validate an odometer reading against the last known one
pub fn validate_odometer(reading: Decimal, current: Option<Decimal>) -> Result<(), &'static str> {
    if reading < Decimal::ZERO {
        return Err("Odometer reading cannot be negative");
    }
    if let Some(current) = current {
        if reading < current {
            return Err("Odometer reading cannot be lower than the current reading");
        }
    }
    Ok(())
}

// ============================================================================
// Driver Validations
// ============================================================================

/// Validate a driving licence number: 5-20 alphanumerics once separators are removed
pub fn validate_licence_number(licence: &str) -> Result<(), &'static str> {
    let cleaned: String = licence
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    if cleaned.len() < 5 || cleaned.len() > 20 {
        return Err("Licence number must be 5-20 characters");
    }
    if !cleaned.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Licence number must be letters and digits only");
    }
    Ok(())
}

/// Validate a phone number: 7-15 digits with an optional leading +
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let trimmed = phone.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '-' || c == '(' || c == ')')
    {
        return Err("Phone number contains invalid characters");
    }
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    if !(7..=15).contains(&digits) {
        return Err("Phone number must have 7-15 digits");
    }
    Ok(())
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err("Invalid email format");
    };
    if local.is_empty() || domain.len() < 3 || !domain.contains('.') || domain.contains('@') {
        return Err("Invalid email format");
    }
    if domain.starts_with('.') || domain.ends_with('.') || email.contains(char::is_whitespace) {
        return Err("Invalid email format");
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    if password.len() > 72 {
        // bcrypt ignores everything past 72 bytes
        return Err("Password must be at most 72 bytes");
    }
    Ok(())
}

/// Validate that `end` does not precede `start`
pub fn validate_date_range(start: NaiveDate, end: Option<NaiveDate>) -> Result<(), &'static str> {
    match end {
        Some(end) if end < start => Err("End date cannot be before start date"),
        _ => Ok(()),
    }
}

/// Validate a money amount: non-negative with at most two decimal places
pub fn validate_amount(amount: Decimal) -> Result<(), &'static str> {
    if amount < Decimal::ZERO {
        return Err("Amount cannot be negative");
    }
    if amount.normalize().scale() > 2 {
        return Err("Amount cannot have more than two decimal places");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_normalize_registration() {
        assert_eq!(normalize_registration("ab12 cde"), "AB12CDE");
        assert_eq!(normalize_registration(" 1-abc-234 "), "1ABC234");
    }

    #[test]
    fn test_validate_registration() {
        assert!(validate_registration("AB12 CDE").is_ok());
        assert!(validate_registration("A").is_err());
        assert!(validate_registration("ABCDEFGHIJK").is_err());
        assert!(validate_registration("AB#12").is_err());
    }

    #[test]
    fn test_validate_vin() {
        assert!(validate_vin("1HGCM82633A004352").is_ok());
        assert!(validate_vin("1HGCM82633A00435").is_err());
        assert!(validate_vin("1HGCM82633A00435O").is_err());
        assert!(validate_vin("1HGCM82633A0043-2").is_err());
    }

    #[test]
    fn test_validate_vehicle_year() {
        let today = date(2026, 10, 19);
        assert!(validate_vehicle_year(2027, today).is_ok());
        assert!(validate_vehicle_year(2028, today).is_err());
        assert!(validate_vehicle_year(1899, today).is_err());
    }

    #[test]
    fn test_validate_odometer() {
        let current = Some(Decimal::from(1000));
        assert!(validate_odometer(Decimal::from(1000), current).is_ok());
        assert!(validate_odometer(Decimal::from(999), current).is_err());
        assert!(validate_odometer(Decimal::from(-1), None).is_err());
        assert!(validate_odometer(Decimal::from(5), None).is_ok());
    }

    #[test]
    fn test_validate_licence_number() {
        assert!(validate_licence_number("MORGA 753116 SM9IJ").is_ok());
        assert!(validate_licence_number("1234").is_err());
        assert!(validate_licence_number("ABC/12345").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+44 7700 900123").is_ok());
        assert!(validate_phone("(02) 9876-5432").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("call me").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ops@fleet.example").is_ok());
        assert!(validate_email("ops@fleet").is_err());
        assert!(validate_email("@fleet.example").is_err());
        assert!(validate_email("ops@.example").is_err());
        assert!(validate_email("o ps@fleet.example").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("hunter22").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(73)).is_err());
    }

    #[test]
    fn test_validate_date_range() {
        assert!(validate_date_range(date(2026, 1, 1), None).is_ok());
        assert!(validate_date_range(date(2026, 1, 1), Some(date(2026, 1, 1))).is_ok());
        assert!(validate_date_range(date(2026, 1, 2), Some(date(2026, 1, 1))).is_err());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(Decimal::from_str("250.00").unwrap()).is_ok());
        assert!(validate_amount(Decimal::from_str("250.5").unwrap()).is_ok());
        assert!(validate_amount(Decimal::from_str("250.505").unwrap()).is_err());
        assert!(validate_amount(Decimal::from_str("-1").unwrap()).is_err());
    }

    mod properties {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn vin_alphabet_always_accepted(vin in "[A-HJ-NPR-Z0-9]{17}") {
                prop_assert!(validate_vin(&vin).is_ok());
            }

            #[test]
            fn phone_digit_count_enforced(digits in "[0-9]{1,20}") {
                let ok = validate_phone(&format!("+{}", digits)).is_ok();
                prop_assert_eq!(ok, (7..=15).contains(&digits.len()));
            }
        }
    }
}
