//! Per-run output directory.
//!
//! ```text
//! <root>/prompts/<stem>_prompt.txt
//! <root>/responses/<stem>_response.txt
//! <root>/updated/<stem>_updated.py
//! <root>/report.json
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;
use upgraider_core::Report;

use crate::StoreError;

pub const REPORT_FILE: &str = "report.json";

/// Writes prompts, raw responses, patched snippets and the run report.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write_prompt(&self, stem: &str, prompt: &str) -> Result<PathBuf, StoreError> {
        self.write("prompts", &format!("{stem}_prompt.txt"), prompt)
    }

    pub fn write_response(&self, stem: &str, response: &str) -> Result<PathBuf, StoreError> {
        self.write("responses", &format!("{stem}_response.txt"), response)
    }

    pub fn write_updated(&self, stem: &str, code: &str) -> Result<PathBuf, StoreError> {
        self.write("updated", &format!("{stem}_updated.py"), code)
    }

    /// Write `report.json` as pretty-printed JSON.
    pub fn write_report(&self, report: &Report) -> Result<PathBuf, StoreError> {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(REPORT_FILE);
        std::fs::write(&path, json)?;
        debug!(path = %path.display(), "wrote report");
        Ok(path)
    }

    fn write(&self, subdir: &str, file: &str, contents: &str) -> Result<PathBuf, StoreError> {
        let dir = self.root.join(subdir);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(file);
        std::fs::write(&path, contents)?;
        debug!(path = %path.display(), "wrote artifact");
        Ok(path)
    }
}

pub fn read_report(path: &Path) -> Result<Report, StoreError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Every `report.json` below `dir`, in sorted path order.
pub fn find_reports(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.file_name().is_some_and(|n| n == REPORT_FILE) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use upgraider_core::{DbSource, Library};

    fn report() -> Report {
        let library = Library {
            name: "scipy".into(),
            ghurl: "https://github.com/scipy/scipy".into(),
            baseversion: "1.9.0".into(),
            currentversion: "1.12.0".into(),
            path: "/libs/scipy".into(),
        };
        Report::new(library, DbSource::ModelOnly, "gpt-3.5", BTreeMap::new())
    }

    #[test]
    fn artifact_layout() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());

        let prompt = store.write_prompt("msort", "prompt text").unwrap();
        let response = store.write_response("msort", "response text").unwrap();
        let updated = store.write_updated("msort", "import numpy\n").unwrap();

        assert_eq!(prompt, tmp.path().join("prompts/msort_prompt.txt"));
        assert_eq!(response, tmp.path().join("responses/msort_response.txt"));
        assert_eq!(updated, tmp.path().join("updated/msort_updated.py"));
        assert_eq!(std::fs::read_to_string(updated).unwrap(), "import numpy\n");
    }

    #[test]
    fn report_round_trips_through_disk() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path().join("out"));
        let written = report();
        let path = store.write_report(&written).unwrap();
        assert_eq!(read_report(&path).unwrap(), written);
    }

    #[test]
    fn find_reports_recurses() {
        let tmp = TempDir::new().unwrap();
        ArtifactStore::new(tmp.path().join("numpy/doc")).write_report(&report()).unwrap();
        ArtifactStore::new(tmp.path().join("numpy/modelonly")).write_report(&report()).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();

        let found = find_reports(tmp.path()).unwrap();
        assert_eq!(
            found,
            vec![
                tmp.path().join("numpy/doc/report.json"),
                tmp.path().join("numpy/modelonly/report.json"),
            ]
        );
    }
}
