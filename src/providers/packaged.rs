use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

pub const DATA_DIR_ENV: &str = "CMORKIT_DATA_DIR";

/// Resources bundled in the distribution's `data/` directory.
#[derive(Debug, Clone)]
pub struct PackagedResources {
    root: Utf8PathBuf,
}

impl PackagedResources {
    pub fn new() -> Self {
        let root = std::env::var(DATA_DIR_ENV)
            .ok()
            .filter(|value| !value.is_empty())
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data"));
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
            Some(path)
        } else {
            debug!(path = %path, "no packaged copy");
            None
        }
    }
}

impl Default for PackagedResources {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_and_absent_subdirectories() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(root.join("cmip7").as_std_path()).unwrap();
        let packaged = PackagedResources::with_root(root.clone());

        assert_eq!(packaged.locate("cmip7"), Some(root.join("cmip7")));
        assert!(packaged.locate("cmip5").is_none());
    }

    #[test]
    fn distribution_ships_no_cmip7_variable_info() {
        let packaged = PackagedResources::with_root(
            Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data"),
        );
        assert!(packaged.locate("cmip7").is_none());
        assert!(packaged.locate("dimensionless_mappings.json").is_some());
    }
}
