use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{CountyCode, SourceKind};

/// Failures while reading a source dataset into a keyed table.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("{dataset} source file not found: {}", .path.display())]
    NotFound { dataset: SourceKind, path: PathBuf },

    #[error("failed to read {dataset} source {}: {err}", .path.display())]
    Io {
        dataset: SourceKind,
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("CSV parsing failed for {dataset}: {err}")]
    Csv {
        dataset: SourceKind,
        #[source]
        err: csv::Error,
    },

    #[error("JSON parsing failed for {dataset}: {err}")]
    Json {
        dataset: SourceKind,
        #[source]
        err: serde_json::Error,
    },

    #[error("{dataset} source is missing required column '{column}'")]
    MissingColumn { dataset: SourceKind, column: String },

    #[error("{dataset} row {row}: invalid county code '{value}'")]
    InvalidCode {
        dataset: SourceKind,
        row: usize,
        value: String,
    },

    #[error("{dataset} row {row}: column '{column}' has non-numeric value '{value}'")]
    InvalidNumber {
        dataset: SourceKind,
        row: usize,
        column: String,
        value: String,
    },

    #[error("{dataset} source has duplicate county code {code}")]
    DuplicateCode { dataset: SourceKind, code: CountyCode },

    #[error("{dataset} source is malformed: {message}")]
    Malformed { dataset: SourceKind, message: String },
}

/// Structural failures while merging tables on the county code.
#[derive(Error, Debug)]
pub enum JoinError {
    #[error("anchor table ({dataset}) has no rows")]
    EmptyAnchor { dataset: SourceKind },

    #[error("{dataset} table shares no county codes with the anchor table")]
    NoOverlap { dataset: SourceKind },
}

/// Raised only for values that cannot occur in a valid census extract.
#[derive(Error, Debug)]
pub enum DerivationError {
    #[error("county {code}: {field} is negative ({value})")]
    Negative {
        code: CountyCode,
        field: &'static str,
        value: f64,
    },

    #[error("county {code}: {field} ({value}) exceeds {total_field} ({total})")]
    Inconsistent {
        code: CountyCode,
        field: &'static str,
        value: f64,
        total_field: &'static str,
        total: f64,
    },
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("column '{column}' is not present in the input table")]
    MissingColumn { column: String },

    #[error("'{0}' is a category column and cannot be plotted as a metric")]
    NotAMetric(String),

    #[error("'{0}' is a numeric column and cannot be used as a category")]
    NotACategory(String),

    #[error("map visualization '{0}' requires the geometry column")]
    MissingGeometry(String),

    #[error("no plottable values for '{0}'")]
    NoData(String),

    #[error("invalid colour '{0}', expected #rrggbb")]
    InvalidColor(String),

    #[error("invalid colour scale: {0}")]
    InvalidScale(String),

    #[error("unsupported output format for {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("drawing backend failed: {0}")]
    Backend(String),

    #[error("I/O error writing {}: {err}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {err}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Pipeline stage names, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Load,
    Join,
    Derive,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::Load => "load",
            Stage::Join => "join",
            Stage::Derive => "derive",
            Stage::Render => "render",
        };
        f.write_str(name)
    }
}

/// Any failure that aborts a run, tagged with the stage it came from.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("config stage failed: {0}")]
    Config(#[from] ConfigError),

    #[error("load stage failed: {0}")]
    Load(#[from] LoadError),

    #[error("join stage failed: {0}")]
    Join(#[from] JoinError),

    #[error("derive stage failed: {0}")]
    Derive(#[from] DerivationError),

    #[error("render stage failed: {0}")]
    Render(#[from] RenderError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Config(_) => Stage::Config,
            PipelineError::Load(_) => Stage::Load,
            PipelineError::Join(_) => Stage::Join,
            PipelineError::Derive(_) => Stage::Derive,
            PipelineError::Render(_) => Stage::Render,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_reports_stage() {
        let err: PipelineError = LoadError::NotFound {
            dataset: SourceKind::Election,
            path: PathBuf::from("missing.csv"),
        }
        .into();

        assert_eq!(err.stage(), Stage::Load);
        let message = err.to_string();
        assert!(message.starts_with("load stage failed"));
        assert!(message.contains("election"));
        assert!(message.contains("missing.csv"));
    }

    #[test]
    fn test_render_error_is_tagged_render() {
        let err: PipelineError = RenderError::UnknownColumn("yield".to_string()).into();
        assert_eq!(err.stage(), Stage::Render);
        assert_eq!(err.to_string(), "render stage failed: unknown column 'yield'");
    }
}
