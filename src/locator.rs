use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::SchemaVersion;
use crate::error::CmorError;
use crate::fetch::{RemoteFetcher, RemoteSource};
use crate::providers::{PackagedResources, VendoredResources};
use crate::store::{CacheStore, CacheValidation};

pub const METADATA_KEYS: &[&str] = &["Compound Name", "Header"];

/// Registries the locator knows how to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ResourceKind {
    Cmip6Cvs,
    Cmip7Cvs,
    Cmip6Tables,
    Cmip7Tables,
    Cmip7Metadata,
}

impl ResourceKind {
    pub fn cvs(schema: SchemaVersion) -> Self {
        match schema {
            SchemaVersion::Cmip6 => ResourceKind::Cmip6Cvs,
            SchemaVersion::Cmip7 => ResourceKind::Cmip7Cvs,
        }
    }

    pub fn tables(schema: SchemaVersion) -> Self {
        match schema {
            SchemaVersion::Cmip6 => ResourceKind::Cmip6Tables,
            SchemaVersion::Cmip7 => ResourceKind::Cmip7Tables,
        }
    }

    /// CMIP6 has no separate data request metadata file.
    pub fn metadata(schema: SchemaVersion) -> Option<Self> {
        match schema {
            SchemaVersion::Cmip6 => None,
            SchemaVersion::Cmip7 => Some(ResourceKind::Cmip7Metadata),
        }
    }

    pub fn spec(self) -> ResourceSpec {
        match self {
            ResourceKind::Cmip6Cvs => ResourceSpec {
                name: "cmip6-cvs",
                default_version: Some("6.2.58.64"),
                layout: Layout::Directory,
                validation: CacheValidation::NonEmpty,
                remote: RemoteSource::git("https://github.com/WCRP-CMIP/CMIP6_CVs.git"),
                repo_subdir: None,
                packaged_subdir: None,
                vendored_subdir: Some("cmip6-cmor-tables/CMIP6_CVs"),
            },
            ResourceKind::Cmip7Cvs => ResourceSpec {
                name: "cmip7-cvs",
                default_version: Some("src-data"),
                layout: Layout::Directory,
                validation: CacheValidation::NonEmpty,
                remote: RemoteSource::git("https://github.com/WCRP-CMIP/CMIP7-CVs.git"),
                repo_subdir: None,
                packaged_subdir: None,
                vendored_subdir: Some("CMIP7-CVs"),
            },
            ResourceKind::Cmip6Tables => ResourceSpec {
                name: "cmip6-tables",
                default_version: Some("main"),
                layout: Layout::Directory,
                validation: CacheValidation::NonEmpty,
                remote: RemoteSource::git("https://github.com/PCMDI/cmip6-cmor-tables.git"),
                repo_subdir: Some("Tables"),
                packaged_subdir: None,
                vendored_subdir: Some("cmip6-cmor-tables/Tables"),
            },
            ResourceKind::Cmip7Tables => ResourceSpec {
                name: "cmip7-tables",
                default_version: Some("main"),
                layout: Layout::Directory,
                validation: CacheValidation::NonEmpty,
                remote: RemoteSource::None,
                repo_subdir: None,
                packaged_subdir: Some("cmip7"),
                vendored_subdir: None,
            },
            ResourceKind::Cmip7Metadata => ResourceSpec {
                name: "cmip7_metadata",
                default_version: Some("v1.2.2.2"),
                layout: Layout::File("metadata.json"),
                validation: CacheValidation::JsonWithAnyKey(METADATA_KEYS),
                remote: RemoteSource::Command {
                    program: "export_dreq_lists_json".to_string(),
                },
                repo_subdir: None,
                packaged_subdir: None,
                vendored_subdir: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Directory,
    /// A single file stored under the version directory.
    File(&'static str),
}

/// Static description of where one kind of resource can live.
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    pub name: &'static str,
    pub default_version: Option<&'static str>,
    pub layout: Layout,
    pub validation: CacheValidation,
    pub remote: RemoteSource,
    /// Subdirectory of a fetched checkout holding the actual content.
    pub repo_subdir: Option<&'static str>,
    pub packaged_subdir: Option<&'static str>,
    pub vendored_subdir: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdentity {
    pub resource_name: String,
    pub version: Option<String>,
    pub user_path: Option<Utf8PathBuf>,
}

impl ResourceIdentity {
    pub fn new(spec: &ResourceSpec, version: Option<String>, user_path: Option<Utf8PathBuf>) -> Self {
        Self {
            resource_name: spec.name.to_string(),
            version: version.or_else(|| spec.default_version.map(str::to_string)),
            user_path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    User,
    Cache,
    Remote,
    Packaged,
    Vendored,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tier::User => "user path",
            Tier::Cache => "cache",
            Tier::Remote => "remote",
            Tier::Packaged => "packaged",
            Tier::Vendored => "vendored",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub tier: Tier,
    pub location: String,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.tier, self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedResource {
    pub path: Utf8PathBuf,
    pub tier: Tier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(ResolvedResource),
    NotFound {
        resource: String,
        attempted: Vec<Attempt>,
    },
}

impl Resolution {
    pub fn path(&self) -> Option<&Utf8Path> {
        match self {
            Resolution::Found(found) => Some(&found.path),
            Resolution::NotFound { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<ResolvedResource, CmorError> {
        match self {
            Resolution::Found(found) => Ok(found),
            Resolution::NotFound {
                resource,
                attempted,
            } => Err(CmorError::ResolutionExhausted {
                resource,
                attempted: attempted.iter().map(ToString::to_string).collect(),
            }),
        }
    }
}

/// Walks user path, cache, remote, packaged and vendored copies in that order.
pub struct ResourceLocator<F: RemoteFetcher> {
    store: CacheStore,
    fetcher: F,
    packaged: PackagedResources,
    vendored: VendoredResources,
}

impl<F: RemoteFetcher> ResourceLocator<F> {
    pub fn new(
        store: CacheStore,
        fetcher: F,
        packaged: PackagedResources,
        vendored: VendoredResources,
    ) -> Self {
        Self {
            store,
            fetcher,
            packaged,
            vendored,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn packaged(&self) -> &PackagedResources {
        &self.packaged
    }

    pub fn cache_path(&self, spec: &ResourceSpec, identity: &ResourceIdentity) -> Utf8PathBuf {
        let file = match spec.layout {
            Layout::Directory => None,
            Layout::File(name) => Some(name),
        };
        self.store
            .entry_path(&identity.resource_name, identity.version.as_deref(), file)
    }

    pub fn locate_kind(
        &self,
        kind: ResourceKind,
        version: Option<String>,
        user_path: Option<Utf8PathBuf>,
    ) -> Resolution {
        let spec = kind.spec();
        let identity = ResourceIdentity::new(&spec, version, user_path);
        self.locate(&spec, &identity)
    }

    pub fn locate(&self, spec: &ResourceSpec, identity: &ResourceIdentity) -> Resolution {
        let resource = identity.resource_name.as_str();
        let mut attempted = Vec::new();

        if let Some(user_path) = &identity.user_path {
            if user_path.as_std_path().exists() {
                info!(resource, path = %user_path, "using user-specified path");
                return found(user_path.clone(), Tier::User);
            }
            warn!(resource, path = %user_path, "user-specified path does not exist");
            attempted.push(Attempt {
                tier: Tier::User,
                location: user_path.to_string(),
            });
        }

        let cache_path = self.cache_path(spec, identity);
        if cache_path.as_std_path().exists() {
            if CacheStore::is_valid(&cache_path, spec.validation) {
                debug!(resource, path = %cache_path, "cache hit");
                return found(with_repo_subdir(spec, &cache_path), Tier::Cache);
            }
            warn!(resource, path = %cache_path, "cached copy is invalid; discarding");
            if let Err(err) = CacheStore::invalidate(&cache_path) {
                warn!(resource, error = %err, "failed to discard invalid cache entry");
            }
        }
        attempted.push(Attempt {
            tier: Tier::Cache,
            location: cache_path.to_string(),
        });

        if spec.remote != RemoteSource::None {
            attempted.push(Attempt {
                tier: Tier::Remote,
                location: spec.remote.describe(),
            });
            match self.populate(spec, identity, &cache_path) {
                Ok(()) => {
                    info!(resource, path = %cache_path, "fetched into cache");
                    return found(with_repo_subdir(spec, &cache_path), Tier::Remote);
                }
                Err(err) => {
                    warn!(resource, source = %spec.remote.describe(), error = %err, "remote fetch failed");
                }
            }
        }

        if let Some(subdir) = spec.packaged_subdir {
            attempted.push(Attempt {
                tier: Tier::Packaged,
                location: self.packaged.root().join(subdir).to_string(),
            });
            if let Some(path) = self.packaged.locate(subdir) {
                info!(resource, path = %path, "using packaged copy");
                return found(path, Tier::Packaged);
            }
        }

        if let Some(subdir) = spec.vendored_subdir {
            attempted.push(Attempt {
                tier: Tier::Vendored,
                location: self.vendored.root().join(subdir).to_string(),
            });
            if let Some(path) = self.vendored.locate(subdir) {
                info!(resource, path = %path, "using vendored copy");
                return found(path, Tier::Vendored);
            }
        }

        let tried = attempted.iter().map(ToString::to_string).collect::<Vec<_>>();
        error!(resource, tried = %tried.join(", "), "resource could not be located");
        Resolution::NotFound {
            resource: resource.to_string(),
            attempted,
        }
    }

    fn populate(
        &self,
        spec: &ResourceSpec,
        identity: &ResourceIdentity,
        cache_path: &Utf8Path,
    ) -> Result<(), CmorError> {
        let version = identity
            .version
            .as_deref()
            .ok_or_else(|| CmorError::Fetch(format!("{} has no version to fetch", spec.name)))?;
        // Staging sits beside the cache path so the final rename stays on one filesystem.
        let staging = CacheStore::staging_dir(cache_path)?;
        let staging_path = Utf8PathBuf::from_path_buf(staging.path().to_path_buf())
            .map_err(|_| CmorError::Filesystem("invalid temp dir".to_string()))?;
        let target = match spec.layout {
            Layout::Directory => staging_path,
            Layout::File(name) => staging_path.join(name),
        };
        self.fetcher.fetch(&spec.remote, version, &target)?;
        if !CacheStore::is_valid(&target, spec.validation) {
            return Err(CmorError::Fetch(format!(
                "fetched content for {} failed validation",
                spec.name
            )));
        }
        match spec.layout {
            Layout::Directory => CacheStore::publish_dir(staging, cache_path, spec.validation)?,
            Layout::File(_) => CacheStore::publish_file(&target, cache_path, spec.validation)?,
        }
        if !CacheStore::is_valid(cache_path, spec.validation) {
            return Err(CmorError::Fetch(format!(
                "cache entry {cache_path} is invalid after publishing"
            )));
        }
        Ok(())
    }
}

fn found(path: Utf8PathBuf, tier: Tier) -> Resolution {
    Resolution::Found(ResolvedResource { path, tier })
}

fn with_repo_subdir(spec: &ResourceSpec, path: &Utf8Path) -> Utf8PathBuf {
    match spec.repo_subdir {
        Some(subdir) => path.join(subdir),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_uses_default_version() {
        let spec = ResourceKind::Cmip6Cvs.spec();
        let identity = ResourceIdentity::new(&spec, None, None);
        assert_eq!(identity.version.as_deref(), Some("6.2.58.64"));
        let pinned = ResourceIdentity::new(&spec, Some("6.2.15.0".to_string()), None);
        assert_eq!(pinned.version.as_deref(), Some("6.2.15.0"));
    }

    #[test]
    fn cmip6_has_no_metadata_resource() {
        assert_eq!(ResourceKind::metadata(SchemaVersion::Cmip6), None);
        assert_eq!(
            ResourceKind::metadata(SchemaVersion::Cmip7),
            Some(ResourceKind::Cmip7Metadata)
        );
    }

    #[test]
    fn exhausted_resolution_lists_attempts() {
        let resolution = Resolution::NotFound {
            resource: "cmip7-cvs".to_string(),
            attempted: vec![
                Attempt {
                    tier: Tier::Cache,
                    location: "/tmp/cache/cmip7-cvs/src-data".to_string(),
                },
                Attempt {
                    tier: Tier::Vendored,
                    location: "/src/CMIP7-CVs".to_string(),
                },
            ],
        };
        let err = resolution.into_result().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("cmip7-cvs"));
        assert!(message.contains("cache (/tmp/cache/cmip7-cvs/src-data)"));
        assert!(message.contains("vendored (/src/CMIP7-CVs)"));
    }

    #[test]
    fn resolved_resource_serializes_path_as_string() {
        let resolved = ResolvedResource {
            path: Utf8PathBuf::from("/tmp/cache/cmip6-cvs/6.2.58.64"),
            tier: Tier::Cache,
        };
        let value = serde_json::to_value(&resolved).unwrap();
        assert_eq!(value["path"], "/tmp/cache/cmip6-cvs/6.2.58.64");
        assert_eq!(value["tier"], "cache");
    }
}
