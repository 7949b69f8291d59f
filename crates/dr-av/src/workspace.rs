//! Scoped temporary file for a raw capture.
//!
//! A [`RawFile`] reserves a uniquely named path for one rip job. The file is
//! removed when the value is dropped, so every exit path of the owning job
//! (success, tool failure, cancellation, panic unwinding) cleans it up.

use std::path::Path;

use tempfile::TempPath;

/// File name prefix for raw capture files.
const RAW_PREFIX: &str = "discrip-";

/// File name suffix for raw capture files (MPEG program stream).
const RAW_SUFFIX: &str = ".vob";

/// A uniquely named raw capture file, deleted on drop.
#[derive(Debug)]
pub struct RawFile {
    path: TempPath,
}

impl RawFile {
    /// Reserve a new raw file inside `dir`.
    ///
    /// The file is created empty so the name cannot be claimed by another
    /// job; capture tools truncate and overwrite it.
    pub fn new_in(dir: &Path) -> dr_core::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let file = tempfile::Builder::new()
            .prefix(RAW_PREFIX)
            .suffix(RAW_SUFFIX)
            .tempfile_in(dir)?;

        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now, reporting any error.
    ///
    /// A file that is already gone is not an error.
    pub fn close(self) -> dr_core::Result<()> {
        match self.path.close() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Size of the file at `path`, or `None` if it cannot be read.
pub fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}
