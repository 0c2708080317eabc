//! Beamline-specific error types.

use om_elements::ElementError;
use om_linalg::LinalgError;
use thiserror::Error;

/// Beamline construction and composition errors.
#[derive(Error, Debug, Clone)]
pub enum BeamlineError {
    #[error("Invalid configuration: {what}")]
    InvalidConfiguration { what: String },

    #[error("Element {index} ('{name}'): {source}")]
    Element {
        index: usize,
        name: String,
        #[source]
        source: ElementError,
    },

    #[error("Linear algebra error: {0}")]
    Linalg(#[from] LinalgError),
}

pub type BeamlineResult<T> = Result<T, BeamlineError>;

impl BeamlineError {
    pub fn invalid(what: impl Into<String>) -> Self {
        BeamlineError::InvalidConfiguration { what: what.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_error_names_position() {
        let err = BeamlineError::Element {
            index: 3,
            name: "QF".into(),
            source: ElementError::NonPhysical { what: "test" },
        };
        let msg = err.to_string();
        assert!(msg.contains('3'));
        assert!(msg.contains("QF"));
    }
}
