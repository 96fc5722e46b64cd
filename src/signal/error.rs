use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid selection: {0}")]
    Validation(String),
    #[error("index out of range: {0}")]
    Range(String),
    #[error("classification service error: {0}")]
    Service(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("failed to render plot: {0}")]
    Plot(String),
    #[error("export failed: {0}")]
    Export(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ViewerError {
    /// Range problems are viewport overshoot and are always recovered locally.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, ViewerError::Range(_))
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        ViewerError::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ViewerError::Validation(msg.into())
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for ViewerError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        ViewerError::Plot(format!("{value:?}"))
    }
}

impl From<image::ImageError> for ViewerError {
    fn from(value: image::ImageError) -> Self {
        ViewerError::Plot(value.to_string())
    }
}

impl From<csv::Error> for ViewerError {
    fn from(value: csv::Error) -> Self {
        ViewerError::Parse(value.to_string())
    }
}

impl From<hound::Error> for ViewerError {
    fn from(value: hound::Error) -> Self {
        ViewerError::Export(value.to_string())
    }
}

impl From<serde_json::Error> for ViewerError {
    fn from(value: serde_json::Error) -> Self {
        ViewerError::Export(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_errors_stay_internal() {
        assert!(!ViewerError::Range("900..1100".into()).is_user_facing());
        assert!(ViewerError::parse("empty").is_user_facing());
        assert!(ViewerError::Service("timeout".into()).is_user_facing());
    }
}
