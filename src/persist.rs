//! Saving and loading learned trees.
//!
//! A model file is an [`RptDocument`]: a format version, the class label,
//! the learner configuration, and the full node structure. It is written as
//! pretty JSON for `.json` paths and as bincode otherwise.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::LearnerConfig;
use crate::error::{PersistError, PersistResult};
use crate::rpt::node::RptNode;
use crate::rpt::Rpt;
use crate::source::ClassLabel;

/// Current model file format.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Json,
    Binary,
}

impl ModelFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ModelFormat::Json,
            _ => ModelFormat::Binary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RptDocument {
    pub format_version: u32,
    pub class_label: ClassLabel,
    pub config: LearnerConfig,
    pub root: RptNode,
}

impl RptDocument {
    pub fn from_rpt(rpt: &Rpt) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            class_label: rpt.class_label().clone(),
            config: rpt.config().clone(),
            root: rpt.root().clone(),
        }
    }

    pub fn into_rpt(self) -> PersistResult<Rpt> {
        if self.format_version != FORMAT_VERSION {
            return Err(PersistError::Version {
                found: self.format_version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(Rpt::new(self.root, self.class_label, self.config))
    }
}

pub fn to_json(rpt: &Rpt) -> PersistResult<String> {
    serde_json::to_string_pretty(&RptDocument::from_rpt(rpt)).map_err(|e| {
        PersistError::Serialize {
            message: e.to_string(),
        }
    })
}

pub fn from_json(json: &str) -> PersistResult<Rpt> {
    let doc: RptDocument =
        serde_json::from_str(json).map_err(|e| PersistError::Deserialize {
            message: e.to_string(),
        })?;
    doc.into_rpt()
}

pub fn to_bytes(rpt: &Rpt) -> PersistResult<Vec<u8>> {
    bincode::serialize(&RptDocument::from_rpt(rpt)).map_err(|e| PersistError::Serialize {
        message: e.to_string(),
    })
}

pub fn from_bytes(bytes: &[u8]) -> PersistResult<Rpt> {
    let doc: RptDocument = bincode::deserialize(bytes).map_err(|e| PersistError::Deserialize {
        message: e.to_string(),
    })?;
    doc.into_rpt()
}

/// Save to `path`, choosing the format from the extension.
pub fn save(rpt: &Rpt, path: &Path) -> PersistResult<()> {
    let bytes = match ModelFormat::from_path(path) {
        ModelFormat::Json => to_json(rpt)?.into_bytes(),
        ModelFormat::Binary => to_bytes(rpt)?,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PersistError::Write {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    std::fs::write(path, bytes).map_err(|e| PersistError::Write {
        path: path.display().to_string(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), leaves = rpt.leaf_count(), "saved model");
    Ok(())
}

pub fn load(path: &Path) -> PersistResult<Rpt> {
    let bytes = std::fs::read(path).map_err(|e| PersistError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    match ModelFormat::from_path(path) {
        ModelFormat::Json => {
            let text = String::from_utf8(bytes).map_err(|e| PersistError::Deserialize {
                message: e.to_string(),
            })?;
            from_json(&text)
        }
        ModelFormat::Binary => from_bytes(&bytes),
    }
}
