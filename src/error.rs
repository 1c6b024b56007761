// Typed errors with thiserror. Surface meaningful messages to JS.
// Remote failures propagate to the calling action; PTZ transport failures never leave the sequencer.

use thiserror::Error;

/// Control panel error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CamError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no such filter of type \"{filter_type}\" found on source \"{source_name}\"")]
    NotFound {
        source_name: String,
        filter_type: String,
    },

    #[error("OBS Studio request {request} failed: {message}")]
    Remote { request: String, message: String },

    #[error("PTZ transport error: {0}")]
    Transport(String),

    #[error("no preset bound to key {0}")]
    UnknownPreset(u8),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CamError {
    pub fn config(message: impl Into<String>) -> Self {
        CamError::Config(message.into())
    }

    pub fn remote(request: &str, message: impl Into<String>) -> Self {
        CamError::Remote {
            request: request.to_string(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CamError {
    fn from(err: serde_json::Error) -> Self {
        CamError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CamError::config("missing \"camera-name\" parameter");
        assert!(err.to_string().contains("camera-name"));
    }

    #[test]
    fn not_found_names_source_and_type() {
        let err = CamError::NotFound {
            source_name: "Cam1".to_string(),
            filter_type: "crop_filter".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Cam1"));
        assert!(msg.contains("crop_filter"));
    }

    #[test]
    fn serde_errors_convert() {
        let err: CamError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, CamError::Serialization(_)));
    }
}
