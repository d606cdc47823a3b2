use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Permission denied error: {0}")]
    PermissionDenied(String),
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("Constraint application failed: {0}")]
    ConstraintFailed(String),
    #[error("Device enumeration failed: {0}")]
    EnumerationFailed(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CameraError {
    /// Errors that should surface as a user-visible "camera unavailable" status.
    pub fn is_start_failure(&self) -> bool {
        matches!(
            self,
            CameraError::PermissionDenied(_) | CameraError::CameraUnavailable(_)
        )
    }

    /// Short reason text without the category prefix, for status lines.
    pub fn reason(&self) -> &str {
        match self {
            CameraError::PermissionDenied(msg)
            | CameraError::CameraUnavailable(msg)
            | CameraError::ConstraintFailed(msg)
            | CameraError::EnumerationFailed(msg)
            | CameraError::Unsupported(msg)
            | CameraError::Config(msg) => msg,
        }
    }
}
