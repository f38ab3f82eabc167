//! Durable storage used to persist individuals.
//!
//! The population only needs a handful of whole-file operations. Each one reports
//! failure through [`io::Result`] so the caller decides whether the failure is fatal
//! (directory creation) or a [`PersistenceWarning`](crate::error::PersistenceWarning)
//! (everything that happens during a generation transition).
//!
//! - [`FsStorage`] - the local filesystem
//! - [`MemoryStorage`] - an in-process map of paths to blobs

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Whole-blob storage addressed by path.
pub trait Storage: fmt::Debug + Send + Sync {
    /// Creates a directory and its parents. Succeeds if it already exists.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Reads the whole blob stored at `path`.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Writes `bytes` at `path`, replacing any existing blob.
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Copies the blob at `from` to `to`, replacing any existing blob at `to`.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Deletes the blob at `path`. Fails if it does not exist.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Moves the blob at `from` to `to`, replacing any existing blob at `to`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Returns `true` if a blob exists at `path`.
    fn exists(&self, path: &Path) -> bool;
}

/// Storage backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStorage;

impl Storage for FsStorage {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::write(path, bytes)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Storage keeping every blob in memory.
///
/// Writing a blob requires its parent directory to have been created first, and fails
/// if a directory already exists at its path, like a filesystem does.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    dirs: BTreeSet<PathBuf>,
    blobs: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryState {
    /// Checks that a blob can be stored at `path`.
    fn check_writable(&self, path: &Path) -> io::Result<()> {
        if self.dirs.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", path.display()),
            ));
        }
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !self.dirs.contains(parent) => {
                Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("directory {} does not exist", parent.display()),
                ))
            }
            _ => Ok(()),
        }
    }

    fn blob(&self, path: &Path) -> io::Result<&Vec<u8>> {
        self.blobs.get(path).ok_or_else(|| not_found(path))
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    )
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the paths of every stored blob, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.state().blobs.keys().cloned().collect()
    }
}

impl Storage for MemoryStorage {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            if state.blobs.contains_key(ancestor) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} is a file", ancestor.display()),
                ));
            }
            state.dirs.insert(ancestor.to_owned());
        }
        Ok(())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.state().blob(path).cloned()
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        state.check_writable(path)?;
        state.blobs.insert(path.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state();
        let bytes = state.blob(from)?.clone();
        state.check_writable(to)?;
        state.blobs.insert(to.to_owned(), bytes);
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.state()
            .blobs
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state();
        state.blob(from)?;
        state.check_writable(to)?;
        if let Some(bytes) = state.blobs.remove(from) {
            state.blobs.insert(to.to_owned(), bytes);
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.state().blobs.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(storage: &dyn Storage, root: &Path) {
        let dir = root.join("population");
        storage.create_dir_all(&dir).unwrap();
        storage.create_dir_all(&dir).unwrap();

        let a = dir.join("Individual1.json");
        let b = dir.join("Temp_Individual1.json");

        storage.write(&a, b"first").unwrap();
        assert!(storage.exists(&a));
        assert_eq!(storage.read(&a).unwrap(), b"first");

        storage.copy(&a, &b).unwrap();
        assert_eq!(storage.read(&b).unwrap(), b"first");

        storage.write(&a, b"second").unwrap();
        storage.rename(&b, &a).unwrap();
        assert!(!storage.exists(&b));
        assert_eq!(storage.read(&a).unwrap(), b"first");

        storage.remove(&a).unwrap();
        assert!(!storage.exists(&a));
        assert_eq!(
            storage.remove(&a).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert_eq!(
            storage.copy(&a, &b).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert_eq!(
            storage.rename(&a, &b).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_fs_storage_operations() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FsStorage, dir.path());
    }

    #[test]
    fn test_memory_storage_operations() {
        let storage = MemoryStorage::new();
        exercise(&storage, Path::new("/data"));
        assert!(storage.paths().is_empty());
    }

    #[test]
    fn test_memory_storage_requires_parent_directory() {
        let storage = MemoryStorage::new();
        let path = Path::new("/missing/Individual1.json");
        assert_eq!(
            storage.write(path, b"x").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        storage.create_dir_all(Path::new("/missing")).unwrap();
        storage.write(path, b"x").unwrap();
        assert_eq!(storage.paths(), vec![path.to_owned()]);
    }

    #[test]
    fn test_memory_storage_cannot_create_directory_over_file() {
        let storage = MemoryStorage::new();
        storage.create_dir_all(Path::new("/data")).unwrap();
        storage.write(Path::new("/data/robot"), b"x").unwrap();
        assert!(storage.create_dir_all(Path::new("/data/robot")).is_err());
    }

    #[test]
    fn test_memory_storage_cannot_write_over_directory() {
        let storage = MemoryStorage::new();
        let dir = Path::new("/data/Individual1.json");
        storage.create_dir_all(dir).unwrap();
        storage.write(Path::new("/data/Temp_Individual1.json"), b"x").unwrap();
        assert_eq!(
            storage.write(dir, b"x").unwrap_err().kind(),
            io::ErrorKind::IsADirectory
        );
        assert!(
            storage
                .rename(Path::new("/data/Temp_Individual1.json"), dir)
                .is_err()
        );
        assert!(storage.exists(Path::new("/data/Temp_Individual1.json")));
    }
}
