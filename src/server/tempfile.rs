//! Request-scoped temporary files.
//!
//! Large bodies and uploaded parts are spilled to disk through a
//! [`TempFileManager`]. A fresh manager is created for every request and
//! wrapped in a [`TempFileScope`], whose `Drop` deletes everything the request
//! created no matter how the request ended.

use std::fs::File;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// A freshly created spill file: where it lives and a handle to write it.
#[derive(Debug)]
pub struct TempFileHandle {
    pub path: PathBuf,
    pub file: File,
}

pub trait TempFileManager: Send {
    /// Creates a new empty file that will be removed by [`TempFileManager::clear`].
    fn create_temp_file(&mut self, name_hint: Option<&str>) -> std::io::Result<TempFileHandle>;

    /// Deletes every file created so far. Failures are logged, not returned.
    fn clear(&mut self);
}

pub trait TempFileManagerFactory: Send + Sync {
    fn create(&self) -> Box<dyn TempFileManager>;
}

impl<F> TempFileManagerFactory for F
where
    F: Fn() -> Box<dyn TempFileManager> + Send + Sync,
{
    fn create(&self) -> Box<dyn TempFileManager> {
        self()
    }
}

/// A file in the OS temp directory, named `lantern-*`.
#[derive(Debug)]
pub struct DefaultTempFile {
    file: NamedTempFile,
}

impl DefaultTempFile {
    pub fn new(dir: &Path) -> std::io::Result<Self> {
        let file = tempfile::Builder::new().prefix("lantern-").tempfile_in(dir)?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn delete(self) -> std::io::Result<()> {
        self.file.close()
    }
}

/// Keeps every file it hands out and deletes them all on `clear`.
#[derive(Debug)]
pub struct DefaultTempFileManager {
    dir: PathBuf,
    files: Vec<DefaultTempFile>,
}

impl DefaultTempFileManager {
    pub fn new() -> Self {
        Self::in_dir(std::env::temp_dir())
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Default for DefaultTempFileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TempFileManager for DefaultTempFileManager {
    fn create_temp_file(&mut self, name_hint: Option<&str>) -> std::io::Result<TempFileHandle> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)?;
        }
        let temp = DefaultTempFile::new(&self.dir)?;
        let handle = TempFileHandle {
            path: temp.path().to_path_buf(),
            file: temp.file.as_file().try_clone()?,
        };
        tracing::trace!(path = %handle.path.display(), hint = ?name_hint, "created temp file");
        self.files.push(temp);
        Ok(handle)
    }

    fn clear(&mut self) {
        for temp in self.files.drain(..) {
            let path = temp.path().to_path_buf();
            if let Err(e) = temp.delete() {
                tracing::warn!(path = %path.display(), error = %e, "could not delete temp file");
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTempFileManagerFactory;

impl TempFileManagerFactory for DefaultTempFileManagerFactory {
    fn create(&self) -> Box<dyn TempFileManager> {
        Box::new(DefaultTempFileManager::new())
    }
}

/// Owns one request's temp-file manager and clears it when dropped.
pub struct TempFileScope {
    manager: Box<dyn TempFileManager>,
}

impl TempFileScope {
    pub fn new(manager: Box<dyn TempFileManager>) -> Self {
        Self { manager }
    }
}

impl Deref for TempFileScope {
    type Target = dyn TempFileManager;

    fn deref(&self) -> &Self::Target {
        self.manager.as_ref()
    }
}

impl DerefMut for TempFileScope {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.manager.as_mut()
    }
}

impl Drop for TempFileScope {
    fn drop(&mut self) {
        self.manager.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn scope_drop_deletes_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut scope = TempFileScope::new(Box::new(DefaultTempFileManager::in_dir(dir.path())));
            let mut handle = scope.create_temp_file(Some("upload.bin")).unwrap();
            handle.file.write_all(b"spill").unwrap();
            assert!(handle.path.exists());
            handle.path
        };
        assert!(!path.exists());
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = DefaultTempFileManager::in_dir(dir.path());
        manager.create_temp_file(None).unwrap();
        manager.create_temp_file(None).unwrap();
        assert_eq!(manager.len(), 2);
        manager.clear();
        assert!(manager.is_empty());
        manager.clear();
    }
}
