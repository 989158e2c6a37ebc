use thiserror::Error;

/// Top-level error type for the Greenroom engine.
///
/// Each variant maps to one failure class in the retrieval core. Subsystem
/// crates define their own error types and implement `From<GreenroomError>`
/// so that the `?` operator works seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GreenroomError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Malformed chunk record: {0}")]
    MalformedChunk(String),

    #[error("Reap deletion failed for session {session_id}: {reason}")]
    ReapDeletion { session_id: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for GreenroomError {
    fn from(err: toml::de::Error) -> Self {
        GreenroomError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for GreenroomError {
    fn from(err: toml::ser::Error) -> Self {
        GreenroomError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for GreenroomError {
    fn from(err: serde_json::Error) -> Self {
        GreenroomError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Greenroom operations.
pub type Result<T> = std::result::Result<T, GreenroomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GreenroomError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GreenroomError = io_err.into();
        assert!(matches!(err, GreenroomError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(GreenroomError, &str)> = vec![
            (
                GreenroomError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                GreenroomError::Embedding("upstream 503".to_string()),
                "Embedding error: upstream 503",
            ),
            (
                GreenroomError::Index("collection missing".to_string()),
                "Index error: collection missing",
            ),
            (
                GreenroomError::MalformedChunk("missing chunk_id".to_string()),
                "Malformed chunk record: missing chunk_id",
            ),
            (
                GreenroomError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_reap_deletion_display() {
        let err = GreenroomError::ReapDeletion {
            session_id: "abc123".to_string(),
            reason: "timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Reap deletion failed for session abc123: timeout"
        );
    }

    #[test]
    fn test_error_from_toml_de() {
        let bad_toml = "invalid = [[[";
        let err: std::result::Result<toml::Value, _> = toml::from_str(bad_toml);
        assert!(err.is_err());
        let err: GreenroomError = err.unwrap_err().into();
        assert!(matches!(err, GreenroomError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let bad_json = "{ invalid json }";
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str(bad_json);
        assert!(err.is_err());
        let err: GreenroomError = err.unwrap_err().into();
        assert!(matches!(err, GreenroomError::Serialization(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(GreenroomError::Index("fail".to_string()))
        }

        assert_eq!(returns_ok().unwrap(), 42);
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_debug_impl() {
        let err = GreenroomError::Embedding("test debug".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Embedding"));
        assert!(debug_str.contains("test debug"));
    }
}
