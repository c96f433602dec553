//! Error types for ssrd.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Main error type for ssrd.
#[derive(Error, Debug)]
pub enum SsrError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Output for module {module} is absent (expected to be found at {}). \
         Trigger a build of the module (e.g. `ssrd build`) before evaluating it",
        .path.display()
    )]
    BuildMissing { module: String, path: PathBuf },

    #[error("Cannot build module {module} because {} does not exist", .path.display())]
    EntryPointMissing { module: String, path: PathBuf },

    #[error("'{command}' returned {status}.\n{stderr}")]
    BuildStepFailure {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Unexpected format of bundler metafile {}: {reason}", .path.display())]
    Metafile { path: PathBuf, reason: String },

    #[error("Project watch process stopped before finishing its first build")]
    WatchStopped,

    #[error("Code execution in worker timed out after {}s", .0.as_secs_f64())]
    ExecutionTimeout(Duration),

    #[error("Failed to execute server-side code with {module}: {detail}")]
    ExecutionFailure { module: String, detail: String },

    #[error("Worker transport anomaly: {0}")]
    TransportAnomaly(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SsrError {
    /// Whether the failure came from the code that ran inside the worker rather
    /// than from the worker plumbing.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::ExecutionFailure { .. })
    }
}

/// Result type alias for ssrd operations.
pub type Result<T> = std::result::Result<T, SsrError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_configuration_error_message() {
        let err = SsrError::Configuration("lib/Foo.purs is not under src/".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Configuration"));
        assert!(msg.contains("lib/Foo.purs"));
    }

    #[test]
    fn test_build_missing_error_message() {
        let err = SsrError::BuildMissing {
            module: "EntryPoints.Home".to_string(),
            path: PathBuf::from("/srv/public/assets/ssr/EntryPoints.Home.js"),
        };
        let msg = err.to_string();
        assert!(msg.contains("EntryPoints.Home"));
        assert!(msg.contains("/srv/public/assets/ssr/EntryPoints.Home.js"));
        assert!(msg.contains("ssrd build"));
    }

    #[test]
    fn test_build_step_failure_message() {
        let err = SsrError::BuildStepFailure {
            command: "npx esbuild output/Foo/index.js".to_string(),
            status: ExitStatus::from_raw(1 << 8),
            stderr: "Could not resolve \"react\"".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("npx esbuild"));
        assert!(msg.contains("Could not resolve"));
    }

    #[test]
    fn test_timeout_error_message() {
        let err = SsrError::ExecutionTimeout(Duration::from_secs(10));
        let msg = err.to_string();
        assert!(msg.contains("timed out"));
        assert!(msg.contains("10s"));
    }

    #[test]
    fn test_execution_failure_message() {
        let err = SsrError::ExecutionFailure {
            module: "Foo.Bar".to_string(),
            detail: "Error: boom\n    at eval".to_string(),
        };
        assert!(err.is_execution_failure());
        let msg = err.to_string();
        assert!(msg.contains("Foo.Bar"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_transport_anomaly_is_not_execution_failure() {
        let err = SsrError::TransportAnomaly("worker closed its output".to_string());
        assert!(!err.is_execution_failure());
        assert!(err.to_string().contains("worker closed its output"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: SsrError = io_err.into();
        let msg = err.to_string();
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ nope }").unwrap_err();
        let err: SsrError = json_err.into();
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(SsrError::WatchStopped)
        }

        assert_eq!(returns_ok().unwrap(), 42);
        assert!(returns_err().is_err());
    }
}
