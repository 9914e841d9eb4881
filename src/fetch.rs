use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{info, warn};

use crate::error::CmorError;
use crate::fs_util;
use crate::store::CacheStore;

/// Where a resource can be obtained from when it is not cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSource {
    /// A git repository; the resource version is a tag or branch.
    Git { url: String },
    /// An external generator writing a single file, invoked as
    /// `<program> -a <version> <experiments.json> -m <output>`.
    Command { program: String },
    None,
}

impl RemoteSource {
    pub fn git(url: &str) -> Self {
        RemoteSource::Git {
            url: url.to_string(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RemoteSource::Git { url } => format!("git {url}"),
            RemoteSource::Command { program } => format!("command {program}"),
            RemoteSource::None => "none".to_string(),
        }
    }
}

/// Populates `destination` with one version of a remote resource.
///
/// For git sources `destination` is an existing empty directory; for command
/// sources it is the path of the file to generate. Implementations must not
/// leave partial content behind on success.
pub trait RemoteFetcher: Send + Sync {
    fn fetch(
        &self,
        source: &RemoteSource,
        version: &str,
        destination: &Utf8Path,
    ) -> Result<(), CmorError>;
}

#[derive(Clone)]
pub struct SystemFetcher {
    git: Option<PathBuf>,
    client: Client,
}

impl SystemFetcher {
    pub fn new() -> Result<Self, CmorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cmorkit/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CmorError::Fetch(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| CmorError::Fetch(err.to_string()))?;
        Ok(Self {
            git: find_in_path("git"),
            client,
        })
    }

    pub fn has_git(&self) -> bool {
        self.git.is_some()
    }

    fn clone_git(&self, url: &str, version: &str, destination: &Utf8Path) -> Result<(), CmorError> {
        let git = self
            .git
            .as_ref()
            .ok_or_else(|| CmorError::MissingTool("git".to_string()))?;
        let checkout = tempfile::Builder::new()
            .prefix("cmorkit-clone")
            .tempdir()
            .map_err(|err| CmorError::Filesystem(err.to_string()))?;
        let checkout_path = Utf8PathBuf::from_path_buf(checkout.path().to_path_buf())
            .map_err(|_| CmorError::Filesystem("invalid temp dir".to_string()))?;
        let args = vec![
            "clone".to_string(),
            "--depth".to_string(),
            "1".to_string(),
            "--branch".to_string(),
            version.to_string(),
            "--recurse-submodules".to_string(),
            url.to_string(),
            checkout_path.to_string(),
        ];
        run_cmd(git, &args)?;
        CacheStore::copy_dir_recursive(&checkout_path, destination, &[".git"])
    }

    fn download_archive(
        &self,
        url: &str,
        version: &str,
        destination: &Utf8Path,
    ) -> Result<(), CmorError> {
        let archive_url = archive_url(url, version).ok_or_else(|| {
            CmorError::Fetch(format!("no archive download available for {url}"))
        })?;
        info!(url = %archive_url, "downloading archive");
        let response = self
            .client
            .get(&archive_url)
            .send()
            .map_err(|err| CmorError::Fetch(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "archive download failed".to_string());
            return Err(CmorError::FetchStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| CmorError::Fetch(err.to_string()))?;
        let mut archive = tempfile::Builder::new()
            .prefix("cmorkit-archive")
            .suffix(".zip")
            .tempfile()
            .map_err(|err| CmorError::Filesystem(err.to_string()))?;
        std::io::Write::write_all(&mut archive, &bytes)
            .map_err(|err| CmorError::Filesystem(err.to_string()))?;
        let written = fs_util::extract_zip(archive.path(), destination.as_std_path(), 1)?;
        if written == 0 {
            return Err(CmorError::Fetch(format!("archive {archive_url} was empty")));
        }
        Ok(())
    }

    fn generate(
        &self,
        program: &str,
        version: &str,
        destination: &Utf8Path,
    ) -> Result<(), CmorError> {
        let program_path =
            find_in_path(program).ok_or_else(|| CmorError::MissingTool(program.to_string()))?;
        let parent = destination
            .parent()
            .ok_or_else(|| CmorError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| CmorError::Filesystem(err.to_string()))?;
        let experiments = parent.join(format!("{version}_experiments.json"));
        info!(version, "generating CMIP7 metadata");
        let args = vec![
            "-a".to_string(),
            version.to_string(),
            experiments.to_string(),
            "-m".to_string(),
            destination.to_string(),
        ];
        let outcome = run_cmd(&program_path, &args);
        remove_side_product(&experiments);
        outcome?;
        if !destination.as_std_path().exists() {
            return Err(CmorError::Fetch(format!(
                "{program} did not produce {destination}"
            )));
        }
        Ok(())
    }
}

impl RemoteFetcher for SystemFetcher {
    fn fetch(
        &self,
        source: &RemoteSource,
        version: &str,
        destination: &Utf8Path,
    ) -> Result<(), CmorError> {
        match source {
            RemoteSource::Git { url } => match self.clone_git(url, version, destination) {
                Ok(()) => Ok(()),
                Err(err) => {
                    warn!(url = %url, error = %err, "git clone failed; trying archive download");
                    clear_dir(destination)?;
                    self.download_archive(url, version, destination)
                }
            },
            RemoteSource::Command { program } => self.generate(program, version, destination),
            RemoteSource::None => Err(CmorError::NoRemote(destination.to_string())),
        }
    }
}

/// `https://github.com/<org>/<repo>.git` to its zip archive for `reference`.
pub fn archive_url(url: &str, reference: &str) -> Option<String> {
    let rest = url.strip_prefix("https://github.com/")?;
    let repo = rest.strip_suffix(".git").unwrap_or(rest).trim_end_matches('/');
    if repo.split('/').count() != 2 {
        return None;
    }
    Some(format!("https://github.com/{repo}/archive/{reference}.zip"))
}

fn clear_dir(dir: &Utf8Path) -> Result<(), CmorError> {
    let entries = match fs::read_dir(dir.as_std_path()) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };
    for entry in entries {
        let path = entry
            .map_err(|err| CmorError::Filesystem(err.to_string()))?
            .path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|err| CmorError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

fn run_cmd(program: &Path, args: &[String]) -> Result<(), CmorError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| CmorError::Fetch(err.to_string()))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("command failed: {}", program.display())
    } else {
        stderr
    };
    Err(CmorError::Fetch(message))
}

/// Deletes a file the generator leaves behind. Failure only costs disk space.
fn remove_side_product(path: &Utf8Path) {
    if !path.as_std_path().exists() {
        return;
    }
    if let Err(err) = fs::remove_file(path.as_std_path()) {
        warn!(path = %path, error = %err, "failed to remove generator side product");
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_url_for_github_remotes() {
        assert_eq!(
            archive_url("https://github.com/WCRP-CMIP/CMIP6_CVs.git", "6.2.58.64").as_deref(),
            Some("https://github.com/WCRP-CMIP/CMIP6_CVs/archive/6.2.58.64.zip")
        );
        assert_eq!(archive_url("https://example.org/repo.git", "main"), None);
    }

    #[test]
    fn no_remote_is_an_error() {
        let fetcher = SystemFetcher::new().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let dest = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        assert!(fetcher.fetch(&RemoteSource::None, "main", &dest).is_err());
    }

    #[test]
    fn side_product_cleanup_tolerates_failure() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let file = root.join("v1.2.2.2_experiments.json");
        fs::write(file.as_std_path(), b"{}").unwrap();
        remove_side_product(&file);
        assert!(!file.as_std_path().exists());

        let dir = root.join("not-a-file");
        fs::create_dir_all(dir.as_std_path()).unwrap();
        remove_side_product(&dir);
        assert!(dir.as_std_path().exists());
        remove_side_product(&root.join("absent.json"));
    }
}
