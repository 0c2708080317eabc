//! om-project: lattice document format and validation.
//!
//! A project holds one or more beamline definitions: element definitions,
//! the sequence they appear in, the reference particle and per-beamline
//! solver settings. Documents are YAML or JSON.

use std::path::Path;

pub mod schema;
pub mod validate;

pub use schema::*;
pub use validate::{ValidationError, validate_beamline, validate_project};

pub const LATEST_VERSION: u32 = 1;

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk encoding of a project document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// `.json` files are JSON, anything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }
}

/// Parse and validate a document.
pub fn parse(content: &str, format: DocumentFormat) -> ProjectResult<Project> {
    let project: Project = match format {
        DocumentFormat::Yaml => serde_yaml::from_str(content)?,
        DocumentFormat::Json => serde_json::from_str(content)?,
    };
    validate_project(&project)?;
    Ok(project)
}

/// Validate and serialize a document.
pub fn render(project: &Project, format: DocumentFormat) -> ProjectResult<String> {
    validate_project(project)?;
    Ok(match format {
        DocumentFormat::Yaml => serde_yaml::to_string(project)?,
        DocumentFormat::Json => serde_json::to_string_pretty(project)?,
    })
}

pub fn from_yaml_str(content: &str) -> ProjectResult<Project> {
    parse(content, DocumentFormat::Yaml)
}

/// Load a project, choosing the format from the file extension.
pub fn load(path: &Path) -> ProjectResult<Project> {
    let content = std::fs::read_to_string(path)?;
    parse(&content, DocumentFormat::from_path(path))
}

/// Save a project, choosing the format from the file extension. Invalid
/// projects are never written.
pub fn save(path: &Path, project: &Project) -> ProjectResult<()> {
    let content = render(project, DocumentFormat::from_path(path))?;
    std::fs::write(path, content)?;
    Ok(())
}
