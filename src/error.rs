use thiserror::Error;

/// Unified error type for the FlowGuard library.
#[derive(Debug, Error)]
pub enum FlowGuardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Environment variable not set: {0}")]
    ConfigEnvVar(String),

    #[error("Invalid endpoint pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Notification error: {0}")]
    Notification(String),
}

pub type Result<T> = std::result::Result<T, FlowGuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FlowGuardError = io_err.into();
        assert!(matches!(err, FlowGuardError::Io(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn storage_error_displays_message() {
        let err = FlowGuardError::StorageUnavailable("no such directory".to_string());
        assert_eq!(err.to_string(), "Storage unavailable: no such directory");
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<Vec<u32>>("[1, 2").unwrap_err();
        let err: FlowGuardError = json_err.into();
        assert!(matches!(err, FlowGuardError::Json(_)));
    }

    #[test]
    fn config_parse_error_converts() {
        let bad_toml = "[invalid";
        let toml_err = toml::from_str::<toml::Value>(bad_toml).unwrap_err();
        let err: FlowGuardError = toml_err.into();
        assert!(matches!(err, FlowGuardError::ConfigParse(_)));
    }

    #[test]
    fn regex_error_converts() {
        let re_err = regex::Regex::new("(unclosed").unwrap_err();
        let err: FlowGuardError = re_err.into();
        assert!(matches!(err, FlowGuardError::InvalidPattern(_)));
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FlowGuardError>();
    }
}
