use thiserror::Error;

/// Errors raised by the inference core.
///
/// Out-of-grid interpolation and rejected draws are *not* errors; they are
/// represented as NaN / `-inf` and absorbed by the posterior model.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("No track files for model '{family}' in '{dir}' within metallicity [{min}, {max}].")]
    NoMatchingFiles {
        family: String,
        dir: String,
        min: f64,
        max: f64,
    },

    #[error("Grid is empty: no track rows survive the column filters.")]
    EmptyGrid,

    #[error("Column '{column}' not found in track table '{table}'.")]
    MissingColumn { column: String, table: String },

    #[error("No valid samples: every retained draw has a non-finite log-posterior.")]
    NoValidSamples,

    #[error("Name '{0}' is used both as a fit parameter and as a grid variable.")]
    NameCollision(String),

    #[error("Grid too large: {0}")]
    GridTooLarge(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl FitError {
    pub fn invalid(message: impl Into<String>) -> Self {
        FitError::InvalidConfig(message.into())
    }

    /// Process exit code used by the binary.
    ///
    /// - 2: configuration / input problems
    /// - 3: no data to fit
    /// - 4: the fit itself failed
    pub fn exit_code(&self) -> u8 {
        match self {
            FitError::InvalidConfig(_)
            | FitError::NameCollision(_)
            | FitError::MissingColumn { .. }
            | FitError::Io(_)
            | FitError::Parquet(_)
            | FitError::Arrow(_)
            | FitError::Json(_)
            | FitError::Csv(_) => 2,
            FitError::NoMatchingFiles { .. } | FitError::EmptyGrid | FitError::GridTooLarge(_) => 3,
            FitError::NoValidSamples => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_errors_map_to_exit_codes() {
        let app: AppError = FitError::EmptyGrid.into();
        assert_eq!(app.exit_code(), 3);

        let app: AppError = FitError::NoValidSamples.into();
        assert_eq!(app.exit_code(), 4);
        assert!(app.to_string().contains("No valid samples"));

        let app: AppError = FitError::NameCollision("phase".into()).into();
        assert_eq!(app.exit_code(), 2);
    }
}
