use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source directory not found: {}", .0.display())]
    SourceDirMissing(PathBuf),

    #[error("Input is not valid {encoding}")]
    Decode { encoding: &'static str },

    #[error("Line {line}: expected {expected} fields, found {found}")]
    RaggedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("File has no header row")]
    MissingHeader,

    #[error("Could not parse date: {0}")]
    DateParse(String),
}

pub type Result<T> = std::result::Result<T, MergeError>;
