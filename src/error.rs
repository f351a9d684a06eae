use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SheetError>;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("flowable cannot fit on any page: {0}")]
    UnplaceableFlowable(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("configuration parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// A single document could not be produced. `output` is the path it was meant to land at.
    #[error("error generating {}: {reason}", output.display())]
    Generation { output: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl SheetError {
    pub(crate) fn generation(output: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SheetError::Generation {
            output: output.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_error_names_destination() {
        let err = SheetError::generation("out/Record_2.pdf", "disk full");
        assert_eq!(
            err.to_string(),
            "error generating out/Record_2.pdf: disk full"
        );
    }

    #[test]
    fn io_error_converts() {
        let err: SheetError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, SheetError::Io(_)));
    }
}
