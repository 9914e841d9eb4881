use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde_json::Value;
use tempfile::{Builder, TempDir};
use tracing::debug;

use crate::error::CmorError;

/// Directory under the XDG cache root shared with existing CMOR caches.
pub const CACHE_NAMESPACE: &str = "pycmor";

/// How a cache entry is checked before it is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheValidation {
    /// A directory with at least one entry, or a file with non-zero size.
    NonEmpty,
    /// A JSON object carrying at least one of the given top-level keys.
    JsonWithAnyKey(&'static [&'static str]),
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: Utf8PathBuf,
}

impl CacheStore {
    pub fn new() -> Result<Self, CmorError> {
        let base = match std::env::var_os("XDG_CACHE_HOME").filter(|value| !value.is_empty()) {
            Some(value) => Utf8PathBuf::from_path_buf(PathBuf::from(value))
                .map_err(|_| CmorError::Filesystem("invalid XDG_CACHE_HOME".to_string()))?,
            None => BaseDirs::new()
                .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache")).ok())
                .ok_or_else(|| {
                    CmorError::Filesystem("unable to resolve cache directory".to_string())
                })?,
        };
        Ok(Self {
            root: base.join(CACHE_NAMESPACE),
        })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// `<root>/<name>[/<version>]`
    pub fn entry_dir(&self, name: &str, version: Option<&str>) -> Utf8PathBuf {
        match version {
            Some(version) => self.root.join(name).join(version),
            None => self.root.join(name),
        }
    }

    /// Location of the cached content, including the file name of single-file resources.
    pub fn entry_path(&self, name: &str, version: Option<&str>, file: Option<&str>) -> Utf8PathBuf {
        let dir = self.entry_dir(name, version);
        match file {
            Some(file) => dir.join(file),
            None => dir,
        }
    }

    pub fn ensure_root(&self) -> Result<(), CmorError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| CmorError::Filesystem(err.to_string()))
    }

    pub fn is_valid(path: &Utf8Path, validation: CacheValidation) -> bool {
        let std_path = path.as_std_path();
        match validation {
            CacheValidation::NonEmpty => {
                if std_path.is_dir() {
                    fs::read_dir(std_path)
                        .map(|mut entries| entries.next().is_some())
                        .unwrap_or(false)
                } else {
                    fs::metadata(std_path)
                        .map(|meta| meta.is_file() && meta.len() > 0)
                        .unwrap_or(false)
                }
            }
            CacheValidation::JsonWithAnyKey(keys) => {
                let Ok(content) = fs::read_to_string(std_path) else {
                    return false;
                };
                match serde_json::from_str::<Value>(&content) {
                    Ok(Value::Object(map)) => keys.iter().any(|key| map.contains_key(*key)),
                    _ => false,
                }
            }
        }
    }

    /// Removes a cache entry so that it can be repopulated from scratch.
    pub fn invalidate(path: &Utf8Path) -> Result<(), CmorError> {
        let std_path = path.as_std_path();
        if std_path.is_dir() {
            fs::remove_dir_all(std_path).map_err(|err| CmorError::Filesystem(err.to_string()))?;
        } else if std_path.exists() {
            fs::remove_file(std_path).map_err(|err| CmorError::Filesystem(err.to_string()))?;
        }
        debug!(path = %path, "invalidated cache entry");
        Ok(())
    }

    /// Empty scratch directory next to `dest`, on the same filesystem.
    pub fn staging_dir(dest: &Utf8Path) -> Result<TempDir, CmorError> {
        let parent = dest
            .parent()
            .ok_or_else(|| CmorError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| CmorError::Filesystem(err.to_string()))?;
        Builder::new()
            .prefix(".cmorkit-staging")
            .tempdir_in(parent.as_std_path())
            .map_err(|err| CmorError::Filesystem(err.to_string()))
    }

    /// Moves a fully populated staging directory into place.
    ///
    /// When another writer already published a valid entry at `dest`, that
    /// entry is kept and the staged copy is discarded.
    pub fn publish_dir(
        staging: TempDir,
        dest: &Utf8Path,
        validation: CacheValidation,
    ) -> Result<(), CmorError> {
        if Self::is_valid(dest, validation) {
            debug!(path = %dest, "cache entry populated concurrently; discarding staged copy");
            return Ok(());
        }
        // The staging directory no longer exists after the rename, so the
        // TempDir guard has nothing left to clean up.
        atomic_rename_dir(staging.path(), dest.as_std_path())
            .map_err(|err| CmorError::Filesystem(err.to_string()))
    }

    /// Moves a staged single file into place, keeping a valid `dest` written
    /// by another process in the meantime. Siblings of `dest` are untouched.
    pub fn publish_file(
        staged: &Utf8Path,
        dest: &Utf8Path,
        validation: CacheValidation,
    ) -> Result<(), CmorError> {
        if Self::is_valid(dest, validation) {
            debug!(path = %dest, "cache file populated concurrently; discarding staged copy");
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| CmorError::Filesystem(err.to_string()))?;
        }
        fs::rename(staged.as_std_path(), dest.as_std_path())
            .map_err(|err| CmorError::Filesystem(err.to_string()))
    }

    pub fn copy_dir_recursive(
        source: &Utf8Path,
        dest: &Utf8Path,
        exclude: &[&str],
    ) -> Result<(), CmorError> {
        fs::create_dir_all(dest.as_std_path())
            .map_err(|err| CmorError::Filesystem(err.to_string()))?;
        for entry in walk_dir(source.as_std_path())? {
            let relative = entry
                .strip_prefix(source.as_std_path())
                .map_err(|err| CmorError::Filesystem(err.to_string()))?;
            let excluded = relative.components().any(|component| {
                exclude
                    .iter()
                    .any(|name| component.as_os_str() == std::ffi::OsStr::new(name))
            });
            if excluded {
                continue;
            }
            let target = dest.as_std_path().join(relative);
            if entry.is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|err| CmorError::Filesystem(err.to_string()))?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|err| CmorError::Filesystem(err.to_string()))?;
                }
                fs::copy(&entry, &target).map_err(|err| CmorError::Filesystem(err.to_string()))?;
            }
        }
        Ok(())
    }

    pub fn copy_dir_atomic(
        source: &Utf8Path,
        dest: &Utf8Path,
        exclude: &[&str],
    ) -> Result<(), CmorError> {
        let staging = Self::staging_dir(dest)?;
        let staging_path = Utf8PathBuf::from_path_buf(staging.path().to_path_buf())
            .map_err(|_| CmorError::Filesystem("invalid temp dir".to_string()))?;
        Self::copy_dir_recursive(source, &staging_path, exclude)?;
        atomic_rename_dir(staging.path(), dest.as_std_path())
            .map_err(|err| CmorError::Filesystem(err.to_string()))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CmorError> {
        let parent = path
            .parent()
            .ok_or_else(|| CmorError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| CmorError::Filesystem(err.to_string()))?;
        let temp = Builder::new()
            .prefix(".cmorkit-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| CmorError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content).map_err(|err| CmorError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| CmorError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

pub(crate) fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, CmorError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| CmorError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| CmorError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    fs::rename(from, to)
}
