use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub code: String,
    pub details: Option<FxHashMap<String, String>>,
    pub source: Option<String>,
    #[serde(skip)]
    pub error_source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Clone for ErrorMetadata {
    fn clone(&self) -> Self {
        Self {
            code: self.code.clone(),
            details: self.details.clone(),
            source: self.source.clone(),
            error_source: None,
        }
    }
}

impl PartialEq for ErrorMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.details == other.details && self.source == other.source
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SsrError {
    NotFound(String, Option<ErrorMetadata>),
    Validation(String, Option<ErrorMetadata>),
    Internal(String, Option<ErrorMetadata>),
    Render(String, Option<ErrorMetadata>),
    Serialization(String, Option<ErrorMetadata>),
    Network(String, Option<ErrorMetadata>),
    Timeout(String, Option<ErrorMetadata>),
    Aborted(String, Option<ErrorMetadata>),
    Transport(String, Option<ErrorMetadata>),
    IoError(String, Option<ErrorMetadata>),
}

impl std::fmt::Display for SsrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(msg, _) => write!(f, "Not found: {msg}"),
            Self::Validation(msg, _) => write!(f, "Validation error: {msg}"),
            Self::Internal(msg, _) => write!(f, "{msg}"),
            Self::Render(msg, _) => write!(f, "Render error: {msg}"),
            Self::Serialization(msg, _) => write!(f, "Serialization error: {msg}"),
            Self::Network(msg, _) => write!(f, "Network error: {msg}"),
            Self::Timeout(msg, _) => write!(f, "Timeout error: {msg}"),
            Self::Aborted(msg, _) => write!(f, "Render aborted: {msg}"),
            Self::Transport(msg, _) => write!(f, "Transport error: {msg}"),
            Self::IoError(msg, _) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for SsrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.metadata()
            .and_then(|meta| meta.error_source.as_ref())
            .map(|source| source.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl SsrError {
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(msg, _)
            | Self::Validation(msg, _)
            | Self::Internal(msg, _)
            | Self::Render(msg, _)
            | Self::Serialization(msg, _)
            | Self::Network(msg, _)
            | Self::Timeout(msg, _)
            | Self::Aborted(msg, _)
            | Self::Transport(msg, _)
            | Self::IoError(msg, _) => msg.clone(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_, _) => "NOT_FOUND",
            Self::Validation(_, _) => "VALIDATION",
            Self::Internal(_, _) => "INTERNAL",
            Self::Render(_, _) => "RENDER_ERROR",
            Self::Serialization(_, _) => "SERIALIZATION_ERROR",
            Self::Network(_, _) => "NETWORK",
            Self::Timeout(_, _) => "TIMEOUT_ERROR",
            Self::Aborted(_, _) => "ABORTED",
            Self::Transport(_, _) => "TRANSPORT_ERROR",
            Self::IoError(_, _) => "IO_ERROR",
        }
    }

    fn metadata(&self) -> Option<&ErrorMetadata> {
        match self {
            Self::NotFound(_, meta)
            | Self::Validation(_, meta)
            | Self::Internal(_, meta)
            | Self::Render(_, meta)
            | Self::Serialization(_, meta)
            | Self::Network(_, meta)
            | Self::Timeout(_, meta)
            | Self::Aborted(_, meta)
            | Self::Transport(_, meta)
            | Self::IoError(_, meta) => meta.as_ref(),
        }
    }

    fn metadata_mut(&mut self) -> &mut Option<ErrorMetadata> {
        match self {
            Self::NotFound(_, meta)
            | Self::Validation(_, meta)
            | Self::Internal(_, meta)
            | Self::Render(_, meta)
            | Self::Serialization(_, meta)
            | Self::Network(_, meta)
            | Self::Timeout(_, meta)
            | Self::Aborted(_, meta)
            | Self::Transport(_, meta)
            | Self::IoError(_, meta) => meta,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into(), None)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into(), None)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into(), None)
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into(), None)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into(), None)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into(), None)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into(), None)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted(message.into(), None)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into(), None)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::IoError(message.into(), None)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Internal(message.into(), None)
    }

    /// Errors surfacing from the transport layer; the render stops and nothing is retried.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_, _))
    }

    pub fn with_source(mut self, source: Box<dyn std::error::Error + Send + Sync>) -> Self {
        let code = self.code().to_string();
        let metadata = self.metadata_mut();
        let mut new_meta = metadata.clone().unwrap_or_else(|| ErrorMetadata {
            code,
            details: Some(FxHashMap::default()),
            source: None,
            error_source: None,
        });
        new_meta.source = Some(source.to_string());
        new_meta.error_source = Some(source);
        *metadata = Some(new_meta);
        self
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.set_property(key, value);
        self
    }

    pub fn set_property(&mut self, key: &str, value: &str) {
        let code = self.code().to_string();
        let metadata = self.metadata_mut();
        let meta = metadata.get_or_insert_with(|| ErrorMetadata {
            code,
            details: Some(FxHashMap::default()),
            source: None,
            error_source: None,
        });

        meta.details.get_or_insert_with(FxHashMap::default).insert(key.to_string(), value.to_string());
    }

    pub fn get_property(&self, key: &str) -> Option<&str> {
        self.metadata()
            .and_then(|meta| meta.details.as_ref())
            .and_then(|details| details.get(key))
            .map(String::as_str)
    }
}

impl From<std::io::Error> for SsrError {
    fn from(error: std::io::Error) -> Self {
        Self::IoError(
            error.to_string(),
            Some(ErrorMetadata {
                code: "IO_ERROR".to_string(),
                details: None,
                source: Some("std::io::Error".to_string()),
                error_source: None,
            }),
        )
    }
}

impl From<tokio::time::error::Elapsed> for SsrError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::Timeout(error.to_string(), None)
    }
}

impl From<String> for SsrError {
    fn from(error: String) -> Self {
        Self::Internal(error, None)
    }
}

impl From<&str> for SsrError {
    fn from(error: &str) -> Self {
        Self::Internal(error.to_string(), None)
    }
}

impl From<serde_json::Error> for SsrError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(
            error.to_string(),
            Some(ErrorMetadata {
                code: "JSON_ERROR".to_string(),
                details: None,
                source: Some("serde_json".to_string()),
                error_source: None,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes_variant() {
        assert_eq!(SsrError::render("boom").to_string(), "Render error: boom");
        assert_eq!(SsrError::internal("plain").to_string(), "plain");
        assert_eq!(SsrError::aborted("deadline").to_string(), "Render aborted: deadline");
    }

    #[test]
    fn test_properties_round_trip() {
        let error = SsrError::render("subtree failed").with_property("boundary_id", "B:3");

        assert_eq!(error.get_property("boundary_id"), Some("B:3"));
        assert_eq!(error.get_property("missing"), None);
        assert_eq!(error.code(), "RENDER_ERROR");
        assert_eq!(error.message(), "subtree failed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let error: SsrError = io_error.into();

        assert_eq!(error.code(), "IO_ERROR");
        assert!(error.message().contains("pipe closed"));
    }

    #[test]
    fn test_with_source_exposes_std_source() {
        use std::error::Error as _;

        let io_error = std::io::Error::other("disk gone");
        let error = SsrError::internal("wrapped").with_source(Box::new(io_error));

        assert!(error.source().is_some());
        assert_eq!(error.get_property("anything"), None);
    }

    #[test]
    fn test_transport_detection() {
        assert!(SsrError::transport("client went away").is_transport());
        assert!(!SsrError::timeout("slow").is_transport());
    }
}
