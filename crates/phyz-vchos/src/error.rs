//! Error types for phyz-vchos.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VchosError {
    /// Inconsistent circuit description or configuration, caught before assembly.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Capacitance matrix unusable for the normal-mode problem.
    #[error("ill-posed capacitance matrix at minimum {minimum}: {reason}")]
    IllPosedCapacitance { minimum: usize, reason: String },

    /// Xi matrix without an inverse.
    #[error("singular Xi matrix during {stage}")]
    SingularBasis { stage: String },

    /// Eigenproblem that even the fallback solver could not handle.
    #[error("numerical failure during {stage}: {reason}")]
    NumericalFailure { stage: String, reason: String },

    /// Harmonic-length optimization did not converge.
    #[error(
        "harmonic length optimization for minimum {minimum} did not converge after \
         {iterations} iterations (achieved tolerance {achieved_tolerance:.3e})"
    )]
    OptimizationFailure {
        minimum: usize,
        iterations: usize,
        achieved_tolerance: f64,
    },

    #[error("circuit reported no potential minima")]
    NoMinima,

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VchosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimization_failure_names_minimum() {
        let err = VchosError::OptimizationFailure {
            minimum: 2,
            iterations: 400,
            achieved_tolerance: 0.35,
        };
        let msg = err.to_string();
        assert!(msg.contains("minimum 2"), "{msg}");
        assert!(msg.contains("400"), "{msg}");
    }

    #[test]
    fn test_json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: VchosError = parse.unwrap_err().into();
        assert!(matches!(err, VchosError::Json(_)));
    }
}
