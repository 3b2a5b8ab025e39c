//! Target library descriptor and on-disk layout.
//!
//! A library folder looks like:
//!
//! ```text
//! <libpath>/library.json       {"name", "ghurl", "baseversion", "currentversion"}
//! <libpath>/requirements.txt   optional, forwarded to the sandbox
//! <libpath>/examples/*.py      snippets to fix
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid library descriptor {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    pub ghurl: String,
    pub baseversion: String,
    pub currentversion: String,
    /// Folder the descriptor was loaded from. Not part of `library.json`.
    #[serde(default)]
    pub path: String,
}

impl Library {
    /// Load `<libpath>/library.json`.
    pub fn load(libpath: &Path) -> Result<Self, LibraryError> {
        let path = libpath.join("library.json");
        let text = std::fs::read_to_string(&path).map_err(|source| LibraryError::Io {
            path: path.clone(),
            source,
        })?;
        let mut library: Library =
            serde_json::from_str(&text).map_err(|source| LibraryError::Json {
                path: path.clone(),
                source,
            })?;
        library.path = libpath.to_string_lossy().into_owned();
        tracing::debug!(name = %library.name, version = %library.currentversion, "loaded library");
        Ok(library)
    }

    pub fn examples_dir(&self) -> PathBuf {
        Path::new(&self.path).join("examples")
    }

    /// `requirements.txt`, if the library ships one.
    pub fn requirements_file(&self) -> Option<PathBuf> {
        let path = Path::new(&self.path).join("requirements.txt");
        path.is_file().then_some(path)
    }

    /// Example snippets in sorted order, dotfiles skipped.
    ///
    /// A missing `examples/` folder yields an empty list.
    pub fn example_files(&self) -> Result<Vec<String>, LibraryError> {
        let dir = self.examples_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|source| LibraryError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LibraryError::Io {
                path: dir.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.path().is_file() {
                continue;
            }
            files.push(name);
        }
        files.sort();
        Ok(files)
    }
}
