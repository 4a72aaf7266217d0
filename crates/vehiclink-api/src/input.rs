//! Request field helpers shared by the handlers.

use uuid::Uuid;

use crate::error::ApiError;

/// A field counts as present when it is non-empty after trimming.
pub fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// `mh 12 ab 1234` and `MH12AB1234` name the same vehicle.
pub fn normalize_vehicle_number(number: &str) -> String {
    number
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

pub fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::validation("Invalid user id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_are_absent() {
        assert_eq!(present(&None), None);
        assert_eq!(present(&Some(String::new())), None);
        assert_eq!(present(&Some("   ".into())), None);
        assert_eq!(present(&Some(" x ".into())), Some("x"));
    }

    #[test]
    fn vehicle_numbers_ignore_case_and_spacing() {
        assert_eq!(normalize_vehicle_number("mh 12 ab 1234"), "MH12AB1234");
        assert_eq!(normalize_vehicle_number("MH12AB1234"), "MH12AB1234");
    }

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Asha@Example.COM "), "asha@example.com");
    }

    #[test]
    fn user_ids_must_be_uuids() {
        assert!(parse_user_id("not-a-uuid").is_err());
        assert_eq!(parse_user_id(&Uuid::nil().to_string()).unwrap(), Uuid::nil());
    }
}
