//! Error types for document parsing and system assembly

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a parse call. No partial [`crate::System`] is produced when
/// one of these is returned.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}:{column}: {message}", path.display())]
    Syntax {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{}:{line}:{column}: duplicate symbol '{name}' in module '{module}'", path.display())]
    Duplicate {
        path: PathBuf,
        line: usize,
        column: usize,
        module: String,
        name: String,
    },

    #[error("Invalid annotation document {}: {message}", path.display())]
    Annotation { path: PathBuf, message: String },

    #[error("Invalid path: {}", path.display())]
    InvalidPath { path: PathBuf },
}

impl ParseError {
    /// File the error was reported against.
    pub fn path(&self) -> &std::path::Path {
        match self {
            ParseError::Io { path, .. }
            | ParseError::Syntax { path, .. }
            | ParseError::Duplicate { path, .. }
            | ParseError::Annotation { path, .. }
            | ParseError::InvalidPath { path } => path,
        }
    }

    /// 1-based line and column, when the error points into a document.
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            ParseError::Syntax { line, column, .. } | ParseError::Duplicate { line, column, .. } => {
                Some((*line, *column))
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
