use std::path::PathBuf;

use thiserror::Error;

/// Problems with the run as a whole. Raised before any model is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("dataset root not found: {0:?}")]
    DatasetRootMissing(PathBuf),

    #[error("requested models not found: {}", .0.join(", "))]
    ModelsNotFound(Vec<String>),

    #[error("cannot create directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read column alias table {path:?}: {reason}")]
    AliasTable { path: PathBuf, reason: String },
}

/// Schema problems with one model's raw metadata CSV.
#[derive(Debug, Error)]
pub enum StandardiseError {
    #[error("missing prompt-img-path.csv for model '{model}' at {path:?}")]
    SourceMissing { model: String, path: PathBuf },

    #[error("no rows found in {0:?}")]
    EmptySource(PathBuf),

    #[error("unable to locate prompt column in {0:?}")]
    NoPromptColumn(PathBuf),

    #[error("no step columns found in {0:?}")]
    NoStepColumns(PathBuf),

    #[error("csv error in {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An external scorer (or the index builder) did not complete.
#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: String },
}
