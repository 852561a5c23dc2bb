use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlgoLifeError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Extraction failed for '{source_name}': {message}")]
    ExtractionError {
        source_name: String,
        message: String,
    },

    #[error("Rules error: {message}")]
    RulesError { message: String },

    #[error("Model error: {message}")]
    ModelError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Processing,
    Output,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlgoLifeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::TomlParseError(_) => ErrorCategory::Configuration,
            Self::CsvError(_) | Self::ExtractionError { .. } | Self::ValidationError { .. } => {
                ErrorCategory::Input
            }
            Self::RulesError { .. } | Self::ModelError { .. } | Self::ProcessingError { .. } => {
                ErrorCategory::Processing
            }
            Self::ZipError(_) | Self::SerializationError(_) => ErrorCategory::Output,
            Self::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // the model is an optional part of the report
            Self::ModelError { .. } => ErrorSeverity::Low,
            Self::ExtractionError { .. } | Self::ValidationError { .. } | Self::CsvError(_) => {
                ErrorSeverity::Medium
            }
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::TomlParseError(_)
            | Self::RulesError { .. }
            | Self::ProcessingError { .. } => ErrorSeverity::High,
            Self::ZipError(_) | Self::IoError(_) | Self::SerializationError(_) => {
                ErrorSeverity::Critical
            }
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::ZipError(_) => "Check that the output directory is writable".to_string(),
            Self::CsvError(_) => {
                "Check the CSV file encoding and that every row has the same number of columns"
                    .to_string()
            }
            Self::IoError(_) => "Check that the file exists and permissions are correct".to_string(),
            Self::SerializationError(_) => "Report data could not be serialized".to_string(),
            Self::TomlParseError(_) => "Fix the TOML syntax in the configuration file".to_string(),
            Self::ConfigError { .. } | Self::ConfigValidationError { .. } => {
                "Review the configuration file against the documented sections".to_string()
            }
            Self::InvalidConfigValueError { field, .. } => {
                format!("Provide a valid value for '{}'", field)
            }
            Self::MissingConfigError { field } => format!("Add the '{}' setting", field),
            Self::ExtractionError { .. } => {
                "Convert the lab report to plain text or use the CSV import format".to_string()
            }
            Self::RulesError { .. } => {
                "Check the rules directory and the rule table column headers".to_string()
            }
            Self::ModelError { .. } => "Provide at least 4 scored variables".to_string(),
            Self::ProcessingError { .. } => "Re-run with --verbose for details".to_string(),
            Self::ValidationError { .. } => "Fix the input data and retry".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Input => format!("Input data problem: {}", self),
            ErrorCategory::Processing => format!("Analysis failed: {}", self),
            ErrorCategory::Output => format!("Could not write the report: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, AlgoLifeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_and_severity() {
        let err = AlgoLifeError::MissingConfigError {
            field: "output.output_path".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.recovery_suggestion().contains("output.output_path"));

        let err = AlgoLifeError::ModelError {
            message: "not enough features".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert!(err.user_friendly_message().starts_with("Analysis failed"));
    }
}
