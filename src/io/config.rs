//! JSON run configuration.

use std::fs::File;
use std::path::Path;

use crate::domain::RunConfig;
use crate::error::FitError;

/// Read a run configuration. Missing keys take their defaults.
pub fn read_run_config(path: &Path) -> Result<RunConfig, FitError> {
    let file = File::open(path).map_err(|e| {
        FitError::invalid(format!("Failed to open config '{}': {e}", path.display()))
    })?;
    let config: RunConfig = serde_json::from_reader(file)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn reads_a_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"model": "yapsi", "nsteps": 20, "observables": [{{"name": "log_L", "value": 0.0, "error": 0.1}}]}}"#
        )
        .unwrap();

        let config = read_run_config(file.path()).unwrap();
        assert_eq!(config.model, "yapsi");
        assert_eq!(config.nsteps, 20);
        assert_eq!(config.nrelax, 100);
        assert_eq!(config.observables[0].name, "log_L");
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = read_run_config(Path::new("/nonexistent/run.json")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
