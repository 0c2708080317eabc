//! Content-based hashing for run IDs.

use om_project::schema::BeamlineDef;
use sha2::{Digest, Sha256};

use crate::ResultsResult;
use crate::types::RunType;

/// Hash of the beamline definition, the run type and the solver version.
///
/// Identical inputs map to the same id, so a stored run doubles as a cache
/// entry.
pub fn compute_run_id(
    beamline: &BeamlineDef,
    run_type: &RunType,
    solver_version: &str,
) -> ResultsResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_string(beamline)?.as_bytes());
    hasher.update(serde_json::to_string(run_type)?.as_bytes());
    hasher.update(solver_version.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
