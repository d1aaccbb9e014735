use crate::config::{MAX_ADMIN_LEVEL, MIN_ADMIN_LEVEL};
use crate::errors::ImportError;

pub fn validate_iso3(iso3: &str) -> Result<String, ImportError> {
    let normalized = iso3.to_uppercase();
    if normalized.len() != 3 || !normalized.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ImportError::Validation(
            "ISO-3166 alpha-3 code must be exactly 3 letters (e.g. USA, BEL, GBR)".to_string(),
        ));
    }
    Ok(normalized)
}

pub fn validate_level_range(min: u8, max: u8) -> Result<(), ImportError> {
    if min < MIN_ADMIN_LEVEL || max > MAX_ADMIN_LEVEL {
        return Err(ImportError::Validation(format!(
            "Admin levels must be between {} and {}",
            MIN_ADMIN_LEVEL, MAX_ADMIN_LEVEL
        )));
    }
    if min > max {
        return Err(ImportError::Validation(format!(
            "Admin level range is inverted: {} > {}",
            min, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso3_normalizes_case() {
        assert_eq!(validate_iso3("bel").unwrap(), "BEL");
    }

    #[test]
    fn iso3_rejects_bad_shapes() {
        assert!(validate_iso3("BE").is_err());
        assert!(validate_iso3("BELG").is_err());
        assert!(validate_iso3("B3L").is_err());
        assert!(validate_iso3("").is_err());
    }

    #[test]
    fn level_range_bounds() {
        assert!(validate_level_range(2, 11).is_ok());
        assert!(validate_level_range(4, 4).is_ok());
        assert!(validate_level_range(1, 8).is_err());
        assert!(validate_level_range(4, 12).is_err());
        assert!(validate_level_range(8, 4).is_err());
    }
}
