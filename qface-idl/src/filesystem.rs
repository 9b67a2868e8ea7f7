//! Loading documents from disk and assembling them into a [`System`].

use crate::error::{ParseError, Result};
use crate::parser::parse_source;
use crate::search::did_you_mean;
use crate::system::System;
use crate::types::{Document, Tags};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extension of QFace documents.
pub const DOCUMENT_EXTENSION: &str = "qface";

/// Parse a single document file.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Document> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_source(path, &content)
}

/// Parse one document into a one-document system.
pub fn parse_document<P: AsRef<Path>>(path: P) -> Result<System> {
    parse(&[path])
}

/// Parse files and directories into one system.
///
/// Directories are searched recursively for `.qface` files. The call is
/// atomic: the first failure aborts the whole input set.
pub fn parse<P: AsRef<Path>>(sources: &[P]) -> Result<System> {
    let files = collect_documents(sources)?;
    let documents = files
        .iter()
        .map(parse_file)
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(documents = documents.len(), "parsed documents");

    let mut system = System::from_documents(documents)?;
    for file in &files {
        merge_annotations(&mut system, &file.with_extension("yaml"))?;
    }
    Ok(system)
}

/// Expand sources into the ordered, de-duplicated list of document files.
pub fn collect_documents<P: AsRef<Path>>(sources: &[P]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for source in sources {
        let source = source.as_ref();
        if source.is_dir() {
            for entry in WalkDir::new(source).sort_by_file_name() {
                let entry = entry.map_err(|e| ParseError::Io {
                    path: e.path().unwrap_or(source).to_path_buf(),
                    source: e.into(),
                })?;
                let path = entry.path();
                if entry.file_type().is_file() && is_document(path) {
                    push_unique(&mut seen, &mut files, path)?;
                }
            }
        } else if source.is_file() {
            push_unique(&mut seen, &mut files, source)?;
        } else {
            return Err(ParseError::InvalidPath {
                path: source.to_path_buf(),
            });
        }
    }

    Ok(files)
}

fn is_document(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(DOCUMENT_EXTENSION)
}

fn push_unique(seen: &mut HashSet<PathBuf>, files: &mut Vec<PathBuf>, path: &Path) -> Result<()> {
    let canonical = path.canonicalize().map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if seen.insert(canonical) {
        files.push(path.to_path_buf());
    }
    Ok(())
}

/// Apply a sibling annotation document to the system.
///
/// The document maps symbol identifiers (`module`, `module.Type`,
/// `module.Type#member`) to tags that are deep-merged into the symbol.
/// A missing file is not an error.
pub fn merge_annotations(system: &mut System, path: &Path) -> Result<()> {
    if !path.is_file() {
        return Ok(());
    }
    let content = fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: BTreeMap<String, Option<Tags>> =
        serde_yaml::from_str(&content).map_err(|e| ParseError::Annotation {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    tracing::info!(path = %path.display(), "merge annotations");
    for (identifier, tags) in entries {
        if !system.annotate(&identifier, tags.unwrap_or_default()) {
            tracing::warn!(
                "{}: unknown symbol '{}'{}",
                path.display(),
                identifier,
                did_you_mean(&system.suggest(&identifier))
            );
        }
    }
    Ok(())
}
