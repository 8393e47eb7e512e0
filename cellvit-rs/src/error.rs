//! Error type shared by the dataset, driver and table modules.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = CellvitError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum CellvitError {
    /// The WSI handle has no patched-slide path yet.
    #[error("slide {slide:?} has not been patched into tiles yet")]
    Unpatched { slide: String },

    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Batch member `index` does not share the shape of the first member.
    #[error("patch {index} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("cannot collate an empty batch")]
    EmptyBatch,

    #[error("cell {cell} in patch {patch} has unknown type {value:?}")]
    UnknownCellType {
        patch: String,
        cell: String,
        value: String,
    },

    #[error("cell {cell} in patch {patch} has no {field}")]
    MissingField {
        patch: String,
        cell: String,
        field: &'static str,
    },

    #[error("metadata for patch {patch}: {message}")]
    Metadata { patch: String, message: String },

    #[error("cannot concatenate tables with columns {left:?} and {right:?}")]
    SchemaMismatch {
        left: Vec<String>,
        right: Vec<String>,
    },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("image load {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("writing CSV {}: {source}", path.display())]
    CsvWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("tensor shape: {0}")]
    Tensor(#[from] ndarray::ShapeError),
}

impl CellvitError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv_write(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::CsvWrite {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}
