//! Project loading, saving and introspection.

use std::path::Path;

use om_project::schema::{BeamlineDef, Project, TopologyDef};

use crate::error::{AppError, AppResult};

/// Summary of a beamline for listing.
#[derive(Debug, Clone)]
pub struct BeamlineSummary {
    pub id: String,
    pub name: String,
    pub topology: TopologyDef,
    pub element_count: usize,
    pub length_m: f64,
}

/// Load and validate a project from a YAML or JSON file.
pub fn load_project(path: &Path) -> AppResult<Project> {
    Ok(om_project::load(path)?)
}

/// Check the document rules, then compile every beamline so element
/// parameters the schema cannot check (energies, field strengths) are
/// verified too.
pub fn validate_project(project: &Project) -> AppResult<()> {
    om_project::validate_project(project).map_err(om_project::ProjectError::from)?;
    for beamline in &project.beamlines {
        crate::lattice_compile::compile_beamline(beamline)?;
    }
    Ok(())
}

/// Save a project; the extension selects YAML or JSON.
pub fn save_project(path: &Path, project: &Project) -> AppResult<()> {
    om_project::save(path, project).map_err(|e| match e {
        om_project::ProjectError::Io(source) => AppError::ProjectFileWrite {
            path: path.to_path_buf(),
            source,
        },
        other => AppError::Project(other),
    })
}

/// List all beamlines in the project with summaries.
pub fn list_beamlines(project: &Project) -> Vec<BeamlineSummary> {
    project
        .beamlines
        .iter()
        .map(|bl| {
            let cell_length: f64 = bl
                .sequence
                .iter()
                .filter_map(|id| bl.elements.iter().find(|e| &e.id == id))
                .map(|e| e.length_m)
                .sum();
            BeamlineSummary {
                id: bl.id.clone(),
                name: bl.name.clone(),
                topology: bl.topology,
                element_count: bl.sequence.len() * bl.periods,
                length_m: cell_length * bl.periods as f64,
            }
        })
        .collect()
}

/// Get a specific beamline by ID.
pub fn get_beamline<'a>(project: &'a Project, beamline_id: &str) -> AppResult<&'a BeamlineDef> {
    project
        .beamlines
        .iter()
        .find(|b| b.id == beamline_id)
        .ok_or_else(|| AppError::BeamlineNotFound(beamline_id.to_string()))
}
