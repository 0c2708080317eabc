//! Beamline validation logic.

use std::collections::HashSet;

use om_elements::Element;
use tracing::debug;

use crate::error::{BeamlineError, BeamlineResult};

/// Validate the element sequence: non-empty and every element well formed.
pub(crate) fn validate_elements(elements: &[Element]) -> BeamlineResult<()> {
    if elements.is_empty() {
        return Err(BeamlineError::invalid("beamline has no elements"));
    }

    for (index, element) in elements.iter().enumerate() {
        element.validate().map_err(|source| BeamlineError::Element {
            index,
            name: element.name.clone(),
            source,
        })?;
    }

    // Repeated names are legal (periodic cells reuse them); only note it.
    let mut seen = HashSet::new();
    let repeated = elements
        .iter()
        .filter(|e| !seen.insert(e.name.as_str()))
        .count();
    if repeated > 0 {
        debug!(repeated, "beamline contains repeated element names");
    }

    Ok(())
}
