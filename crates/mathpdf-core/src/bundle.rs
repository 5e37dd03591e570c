//! ZIP archive bundling.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::batch::{ArchiveBundler, NamedOutput};
use crate::error::{Error, Result};

/// Builds a deflate-compressed ZIP archive in memory.
///
/// Entries keep their output names; duplicates get a ` (n)` suffix so no
/// document shadows another.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipBundler;

impl ArchiveBundler for ZipBundler {
    fn bundle(&self, archive_name: &str, outputs: &[&NamedOutput]) -> Result<NamedOutput> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut used = HashSet::new();

        for output in outputs {
            let entry = unique_entry_name(&output.name, &mut used);
            writer
                .start_file(entry.as_str(), options)
                .map_err(|e| Error::Bundle(format!("failed to add {}: {}", entry, e)))?;
            writer
                .write_all(&output.data)
                .map_err(|e| Error::Bundle(format!("failed to write {}: {}", entry, e)))?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| Error::Bundle(format!("failed to finalize archive: {}", e)))?;

        tracing::debug!("Bundled {} entries into {}", outputs.len(), archive_name);
        Ok(NamedOutput {
            name: archive_name.to_string(),
            data: cursor.into_inner(),
        })
    }
}

fn unique_entry_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let mut n = 2;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
