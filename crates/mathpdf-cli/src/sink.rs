//! Delivery of enhanced documents to a directory.

use std::fs;
use std::path::{Path, PathBuf};

use mathpdf_core::{DeliverySink, Error, NamedOutput, Result};

/// Writes each delivered artifact into one output directory.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::Delivery(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DeliverySink for DirectorySink {
    fn deliver(&mut self, artifact: &NamedOutput) -> Result<()> {
        // Names come from input file names; never let them escape the directory.
        let file_name = Path::new(&artifact.name)
            .file_name()
            .ok_or_else(|| Error::Delivery(format!("invalid output name '{}'", artifact.name)))?;
        let path = self.dir.join(file_name);
        fs::write(&path, &artifact.data)
            .map_err(|e| Error::Delivery(format!("cannot write {}: {}", path.display(), e)))?;
        tracing::info!("Wrote {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_into_directory() {
        let temp = tempfile::tempdir().unwrap();
        let out = temp.path().join("out");
        let mut sink = DirectorySink::new(&out).unwrap();

        sink.deliver(&NamedOutput {
            name: "enhanced_a.pdf".to_string(),
            data: b"%PDF-".to_vec(),
        })
        .unwrap();

        assert_eq!(fs::read(out.join("enhanced_a.pdf")).unwrap(), b"%PDF-");
        assert_eq!(sink.dir(), out.as_path());
    }

    #[test]
    fn test_strips_directory_components() {
        let temp = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(temp.path()).unwrap();

        sink.deliver(&NamedOutput {
            name: "../escape.pdf".to_string(),
            data: vec![1],
        })
        .unwrap();

        assert!(temp.path().join("escape.pdf").exists());
    }

    #[test]
    fn test_rejects_empty_name() {
        let temp = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(temp.path()).unwrap();
        let result = sink.deliver(&NamedOutput {
            name: "..".to_string(),
            data: vec![],
        });
        assert!(matches!(result, Err(Error::Delivery(_))));
    }
}
