//! One JSON file per vendor under a templates directory.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use tracing::{debug, error, warn};

use crate::{
    error::{DocAnchorError, DocAnchorResult},
    template::record::TemplateRecord,
};

const TEMPLATE_EXTENSION: &str = "json";
const TEMP_PREFIX: char = '~';

#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `vendor`.
    pub fn path_for(&self, vendor: &str) -> DocAnchorResult<PathBuf> {
        Ok(self.dir.join(sanitize_filename(vendor)?))
    }

    /// Writes `record` atomically: the file is written and synced under a
    /// temporary name, then renamed over the final one.
    pub fn save(&self, vendor: &str, record: &TemplateRecord) -> DocAnchorResult<PathBuf> {
        let result = self.write_atomic(vendor, record);
        if let Err(e) = &result {
            error!(vendor, error = %e, "failed to save template");
        }
        result
    }

    fn write_atomic(&self, vendor: &str, record: &TemplateRecord) -> DocAnchorResult<PathBuf> {
        let file_name = sanitize_filename(vendor)?;
        fs::create_dir_all(&self.dir).map_err(|e| DocAnchorError::io(&self.dir, e))?;

        let target = self.dir.join(&file_name);
        let temp = self.dir.join(format!("{TEMP_PREFIX}{file_name}.tmp"));
        let bytes = serde_json::to_vec_pretty(record)?;

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&temp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&temp, &target)
        };
        if let Err(e) = write() {
            // best effort, the temp name is never read back
            let _ = fs::remove_file(&temp);
            return Err(DocAnchorError::io(&target, e));
        }
        debug!(path = %target.display(), "template saved");
        Ok(target)
    }

    /// Reads the record for `vendor`. Missing and unreadable files are both
    /// reported as `None`; a missing file is logged at debug, an unreadable
    /// one as a warning.
    pub fn load(&self, vendor: &str) -> Option<TemplateRecord> {
        let path = match self.path_for(vendor) {
            Ok(path) => path,
            Err(e) => {
                debug!(vendor, error = %e, "no template file name for vendor");
                return None;
            }
        };
        if !path.is_file() {
            debug!(path = %path.display(), "template not found");
            return None;
        }
        read_record(&path)
            .map_err(|e| warn!(path = %path.display(), error = %e, "unreadable template"))
            .ok()
    }

    pub fn exists(&self, vendor: &str) -> bool {
        self.path_for(vendor).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Every template file in filename order, paired with its parsed record
    /// or the reason it could not be read. Temporary files are ignored. A
    /// missing directory is an empty store.
    pub fn load_all(&self) -> Vec<(PathBuf, DocAnchorResult<TemplateRecord>)> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.dir.display(), error = %e, "templates directory not readable");
                return Vec::new();
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_template_file(path))
            .collect();
        paths.sort();
        paths
            .into_iter()
            .map(|path| {
                let record = read_record(&path);
                (path, record)
            })
            .collect()
    }
}

fn read_record(path: &Path) -> DocAnchorResult<TemplateRecord> {
    let content = fs::read(path).map_err(|e| DocAnchorError::io(path, e))?;
    Ok(serde_json::from_slice(&content)?)
}

fn is_template_file(path: &Path) -> bool {
    path.is_file()
        && path.extension().is_some_and(|ext| ext == TEMPLATE_EXTENSION)
        && !path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(TEMP_PREFIX))
}

/// Derives the file name for a vendor: lowercase, punctuation dropped, runs
/// of whitespace, `_` and `-` collapsed into a single `_`.
pub fn sanitize_filename(vendor: &str) -> DocAnchorResult<String> {
    let lowered = vendor.trim().to_lowercase();
    let mut stem = String::with_capacity(lowered.len());
    let mut pending_separator = false;
    for c in lowered.chars() {
        if c.is_whitespace() || c == '_' || c == '-' {
            pending_separator = true;
        } else if c.is_alphanumeric() {
            if pending_separator && !stem.is_empty() {
                stem.push('_');
            }
            pending_separator = false;
            stem.push(c);
        }
    }
    if stem.is_empty() {
        return Err(DocAnchorError::InvalidVendorName(vendor.to_string()));
    }
    Ok(format!("{stem}.{TEMPLATE_EXTENSION}"))
}
