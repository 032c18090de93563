use crate::utils::error::{ReconcileError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(ReconcileError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(ReconcileError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(ReconcileError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ReconcileError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(ReconcileError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(ReconcileError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| ReconcileError::MissingConfigError {
            field: field_name.to_string(),
        })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ReconcileError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(ReconcileError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("store.base_url", "https://am.example.com/am").is_ok());
        assert!(validate_url("store.base_url", "http://localhost:8080/am").is_ok());
        assert!(validate_url("store.base_url", "").is_err());
        assert!(validate_url("store.base_url", "invalid-url").is_err());
        assert!(validate_url("store.base_url", "ldap://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("driver.max_concurrent_realms", 4, 1).is_ok());
        assert!(validate_positive_number("driver.max_concurrent_realms", 0, 1).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("driver.max_concurrent_realms", 1, 1, 256).is_ok());
        assert!(validate_range("driver.max_concurrent_realms", 256, 1, 256).is_ok());
        assert!(validate_range("driver.max_concurrent_realms", 257, 1, 256).is_err());
        assert!(validate_range("driver.max_concurrent_realms", 0, 1, 256).is_err());
    }

    #[test]
    fn test_validate_required_field() {
        let present = Some("https://am.example.com".to_string());
        assert!(validate_required_field("store.base_url", &present).is_ok());

        let missing: Option<String> = None;
        assert!(matches!(
            validate_required_field("store.base_url", &missing),
            Err(ReconcileError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_validate_non_empty_string() {
        assert!(validate_non_empty_string("policy.required_object_class", "deviceAttributeContainer").is_ok());
        assert!(validate_non_empty_string("policy.required_object_class", "   ").is_err());
    }
}
