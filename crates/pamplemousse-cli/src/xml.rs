//! Reads the PMML document from a file or stdin and hands it to
//! `roxmltree` (§1, §6: XML ingestion is an external collaborator this
//! crate wires up, not something the compiler itself owns).

use std::io::Read;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to read stdin: {0}")]
    Stdin(std::io::Error),
    #[error("malformed XML: {0}")]
    Parse(#[from] roxmltree::Error),
}

/// Reads the whole document into memory: from `path` if given, otherwise
/// from stdin. The returned string outlives the `roxmltree::Document`
/// parsed from it, which borrows from the buffer.
pub fn read_source(path: Option<&Path>) -> Result<String, XmlError> {
    match path {
        Some(path) => std::fs::read_to_string(path).map_err(|source| XmlError::Read { path: path.display().to_string(), source }),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).map_err(XmlError::Stdin)?;
            Ok(buf)
        }
    }
}

pub fn parse(source: &str) -> Result<roxmltree::Document<'_>, XmlError> {
    Ok(roxmltree::Document::parse(source)?)
}
