use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::CmorError;

/// Extracts `zip_path` into `target_dir`, dropping the first `strip_components`
/// path components of every entry (GitHub archives nest everything under
/// `<repo>-<ref>/`).
pub fn extract_zip(
    zip_path: &Path,
    target_dir: &Path,
    strip_components: usize,
) -> Result<usize, CmorError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| CmorError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| CmorError::Filesystem(err.to_string()))?;

    let mut written = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| CmorError::Filesystem(err.to_string()))?;
        let enclosed = match entry.enclosed_name() {
            Some(path) => path,
            None => {
                return Err(CmorError::Filesystem(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };
        let relative: PathBuf = enclosed.components().skip(strip_components).collect();
        if relative.as_os_str().is_empty() {
            continue;
        }
        let entry_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| CmorError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| CmorError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| CmorError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| CmorError::Filesystem(err.to_string()))?;
        written += 1;
    }
    Ok(written)
}
