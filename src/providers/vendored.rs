use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

pub const VENDOR_DIR_ENV: &str = "CMORKIT_VENDOR_DIR";

/// Git submodules checked out next to the crate sources.
#[derive(Debug, Clone)]
pub struct VendoredResources {
    root: Utf8PathBuf,
}

impl VendoredResources {
    pub fn new() -> Self {
        let root = std::env::var(VENDOR_DIR_ENV)
            .ok()
            .filter(|value| !value.is_empty())
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")));
        Self { root }
    }

    pub fn with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn locate(&self, subdir: &str) -> Option<Utf8PathBuf> {
        let path = self.root.join(subdir);
        if path.as_std_path().exists() {
            return Some(path);
        }
        warn!(
            path = %path,
            "submodule not found. Run: git submodule update --init"
        );
        None
    }
}

impl Default for VendoredResources {
    fn default() -> Self {
        Self::new()
    }
}
