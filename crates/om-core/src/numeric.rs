use crate::OmError;

/// Floating point type used throughout the workspace
pub type Real = f64;

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, OmError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(OmError::NonFinite { what, value: v })
    }
}

/// Finite and > 0.
pub fn ensure_positive(v: Real, what: &'static str) -> Result<Real, OmError> {
    let v = ensure_finite(v, what)?;
    if v <= 0.0 {
        return Err(OmError::NotPositive { what, value: v });
    }
    Ok(v)
}
