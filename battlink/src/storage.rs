//! Output directory for received result files.

use {
    crate::error::{Error, Result},
    log::{debug, info},
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// Default location for received files.
pub const DEFAULT_OUTPUT_DIR: &str = "./received_files";

/// Extension of result files listed by [`OutputDir::received_files`].
pub const RESULT_EXTENSION: &str = "csv";

/// Directory where downloaded files are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDir {
    path: PathBuf,
}

impl Default for OutputDir {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

impl OutputDir {
    /// Use `path` as the output directory. Nothing is created yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory if it does not exist.
    pub fn ensure(&self) -> Result<()> {
        if !self.path.is_dir() {
            fs::create_dir_all(&self.path).map_err(|e| {
                Error::Storage(format!("cannot create {}: {e}", self.path.display()))
            })?;
            debug!("Created output directory {}", self.path.display());
        }
        Ok(())
    }

    /// Write `data` verbatim as `name` inside the directory.
    pub fn save(&self, name: &str, data: &[u8]) -> Result<PathBuf> {
        check_file_name(name)?;
        self.ensure()?;

        let path = self.path.join(name);
        fs::write(&path, data)
            .map_err(|e| Error::Storage(format!("failed to save {}: {e}", path.display())))?;
        info!("File saved: {} ({} bytes)", path.display(), data.len());
        Ok(path)
    }

    /// Names of result files already in the directory, sorted.
    pub fn received_files(&self) -> Result<Vec<String>> {
        if !self.path.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry
                .file_type()?
                .is_file()
            {
                continue;
            }
            let path = entry.path();
            let is_result = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(RESULT_EXTENSION));
            if is_result {
                if let Some(name) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Reject names that would escape the output directory.
fn check_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::Storage(format!("unsafe file name: {name:?}")));
    }
    Ok(())
}
