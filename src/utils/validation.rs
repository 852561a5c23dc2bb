use crate::utils::error::{AlgoLifeError, Result};
use std::collections::HashSet;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(AlgoLifeError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(AlgoLifeError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(AlgoLifeError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

/// Extensions are compared case-insensitively; `allowed_extensions` must be lowercase.
pub fn validate_file_extensions(
    field_name: &str,
    files: &[String],
    allowed_extensions: &[&str],
) -> Result<()> {
    let allowed_set: HashSet<&str> = allowed_extensions.iter().copied().collect();

    for file in files {
        validate_path(field_name, file)?;

        let extension = std::path::Path::new(file)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension {
            Some(ext) if allowed_set.contains(ext.as_str()) => {}
            Some(ext) => {
                return Err(AlgoLifeError::InvalidConfigValueError {
                    field: field_name.to_string(),
                    value: file.clone(),
                    reason: format!(
                        "Unsupported file extension: {}. Allowed extensions: {}",
                        ext,
                        allowed_extensions.join(", ")
                    ),
                });
            }
            None => {
                return Err(AlgoLifeError::InvalidConfigValueError {
                    field: field_name.to_string(),
                    value: file.clone(),
                    reason: "File has no extension or invalid filename".to_string(),
                });
            }
        }
    }

    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| AlgoLifeError::MissingConfigError {
            field: field_name.to_string(),
        })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AlgoLifeError::InvalidConfigValueError {
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
        return Err(AlgoLifeError::InvalidConfigValueError {
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
    fn test_validate_path() {
        assert!(validate_path("output.output_path", "./output").is_ok());
        assert!(validate_path("output.output_path", "").is_err());
        assert!(validate_path("output.output_path", "bad\0path").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("model.population_size", 80, 10).is_ok());
        assert!(validate_positive_number("model.population_size", 5, 10).is_err());
    }

    #[test]
    fn test_validate_file_extensions() {
        let files = vec!["bilan.txt".to_string(), "bilan.CSV".to_string()];
        assert!(validate_file_extensions("inputs.biology", &files, &["txt", "csv"]).is_ok());

        let invalid_files = vec!["bilan.pdf".to_string()];
        assert!(validate_file_extensions("inputs.biology", &invalid_files, &["txt", "csv"]).is_err());

        let no_extension = vec!["bilan".to_string()];
        assert!(validate_file_extensions("inputs.biology", &no_extension, &["txt"]).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("patient.age", 45u32, 1, 120).is_ok());
        assert!(validate_range("patient.age", 0u32, 1, 120).is_err());
    }

    #[test]
    fn test_validate_required_field() {
        let present = Some("dir".to_string());
        assert_eq!(validate_required_field("rules.dir", &present).unwrap(), "dir");
        let missing: Option<String> = None;
        assert!(validate_required_field("rules.dir", &missing).is_err());
    }
}
