use std::fs;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use cmorkit::error::CmorError;
use cmorkit::fetch::{RemoteFetcher, RemoteSource};
use cmorkit::locator::{ResourceKind, ResourceLocator, Tier};
use cmorkit::providers::{PackagedResources, VendoredResources};
use cmorkit::store::CacheStore;

#[derive(Default)]
struct MockFetcher {
    calls: Mutex<usize>,
    offline: bool,
}

impl MockFetcher {
    fn offline() -> Self {
        Self {
            calls: Mutex::new(0),
            offline: true,
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl RemoteFetcher for MockFetcher {
    fn fetch(
        &self,
        _source: &RemoteSource,
        version: &str,
        destination: &Utf8Path,
    ) -> Result<(), CmorError> {
        let mut guard = self.calls.lock().unwrap();
        *guard += 1;
        if self.offline {
            return Err(CmorError::Fetch("network unreachable".to_string()));
        }
        fs::create_dir_all(destination.as_std_path()).unwrap();
        fs::write(
            destination.join("CMIP6_activity_id.json").as_std_path(),
            format!(r#"{{"activity_id": {{"CMIP": "core"}}, "version": "{version}"}}"#),
        )
        .unwrap();
        Ok(())
    }
}

struct Roots {
    _temp: tempfile::TempDir,
    cache: Utf8PathBuf,
    data: Utf8PathBuf,
    vendor: Utf8PathBuf,
}

fn roots() -> Roots {
    let temp = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    Roots {
        cache: base.join("cache"),
        data: base.join("data"),
        vendor: base.join("vendor"),
        _temp: temp,
    }
}

fn locator(roots: &Roots, fetcher: MockFetcher) -> ResourceLocator<MockFetcher> {
    ResourceLocator::new(
        CacheStore::new_with_root(roots.cache.clone()),
        fetcher,
        PackagedResources::with_root(roots.data.clone()),
        VendoredResources::with_root(roots.vendor.clone()),
    )
}

fn write(path: &Utf8Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path()).unwrap();
    }
    fs::write(path.as_std_path(), content).unwrap();
}

#[test]
fn vendored_copy_used_when_fetch_fails() {
    let roots = roots();
    let vendored = roots.vendor.join("cmip6-cmor-tables/CMIP6_CVs");
    write(&vendored.join("CMIP6_activity_id.json"), r#"{"activity_id": {}}"#);

    let locator = locator(&roots, MockFetcher::offline());
    let found = locator
        .locate_kind(ResourceKind::Cmip6Cvs, None, None)
        .into_result()
        .unwrap();

    assert_eq!(found.tier, Tier::Vendored);
    assert_eq!(found.path, vendored);
    assert_eq!(locator.fetcher().calls(), 1);
}

#[test]
fn valid_cache_skips_fetch() {
    let roots = roots();
    let entry = roots.cache.join("cmip6-cvs/6.2.58.64");
    write(&entry.join("CMIP6_activity_id.json"), r#"{"activity_id": {}}"#);

    let locator = locator(&roots, MockFetcher::default());
    let found = locator
        .locate_kind(ResourceKind::Cmip6Cvs, None, None)
        .into_result()
        .unwrap();

    assert_eq!(found.tier, Tier::Cache);
    assert_eq!(found.path, entry);
    assert_eq!(locator.fetcher().calls(), 0);
}

#[test]
fn empty_cache_entry_is_refetched() {
    let roots = roots();
    let entry = roots.cache.join("cmip6-cvs/6.2.15.0");
    fs::create_dir_all(entry.as_std_path()).unwrap();

    let locator = locator(&roots, MockFetcher::default());
    let found = locator
        .locate_kind(ResourceKind::Cmip6Cvs, Some("6.2.15.0".to_string()), None)
        .into_result()
        .unwrap();

    assert_eq!(found.tier, Tier::Remote);
    assert_eq!(found.path, entry);
    assert_eq!(locator.fetcher().calls(), 1);
    let content = fs::read_to_string(entry.join("CMIP6_activity_id.json").as_std_path()).unwrap();
    assert!(content.contains("6.2.15.0"));
}

#[test]
fn cached_tables_point_into_repository_subdirectory() {
    let roots = roots();
    let entry = roots.cache.join("cmip6-tables/main");
    write(&entry.join("Tables/CMIP6_Omon.json"), "{}");

    let locator = locator(&roots, MockFetcher::default());
    let found = locator
        .locate_kind(ResourceKind::Cmip6Tables, None, None)
        .into_result()
        .unwrap();

    assert_eq!(found.tier, Tier::Cache);
    assert_eq!(found.path, entry.join("Tables"));
}

#[test]
fn user_path_wins_over_every_other_tier() {
    let roots = roots();
    write(&roots.cache.join("cmip7-cvs/src-data/experiment/historical.json"), "{}");
    let user_dir = roots.data.join("my-cvs");
    fs::create_dir_all(user_dir.as_std_path()).unwrap();

    let locator = locator(&roots, MockFetcher::default());
    let found = locator
        .locate_kind(ResourceKind::Cmip7Cvs, None, Some(user_dir.clone()))
        .into_result()
        .unwrap();

    assert_eq!(found.tier, Tier::User);
    assert_eq!(found.path, user_dir);
    assert_eq!(locator.fetcher().calls(), 0);
}

#[test]
fn missing_user_path_falls_through() {
    let roots = roots();
    let entry = roots.cache.join("cmip7-cvs/src-data");
    write(&entry.join("experiment/historical.json"), "{}");

    let locator = locator(&roots, MockFetcher::default());
    let found = locator
        .locate_kind(
            ResourceKind::Cmip7Cvs,
            None,
            Some(roots.data.join("does-not-exist")),
        )
        .into_result()
        .unwrap();

    assert_eq!(found.tier, Tier::Cache);
}

#[test]
fn packaged_tables_need_no_remote() {
    let roots = roots();
    write(&roots.data.join("cmip7/all_var_info.json"), r#"{"Compound Name": {}}"#);

    let locator = locator(&roots, MockFetcher::default());
    let found = locator
        .locate_kind(ResourceKind::Cmip7Tables, None, None)
        .into_result()
        .unwrap();

    assert_eq!(found.tier, Tier::Packaged);
    assert_eq!(locator.fetcher().calls(), 0);
}

#[test]
fn metadata_without_expected_keys_is_not_trusted() {
    let roots = roots();
    write(
        &roots.cache.join("cmip7_metadata/v1.2.2.2/metadata.json"),
        r#"{"unrelated": true}"#,
    );

    let locator = locator(&roots, MockFetcher::offline());
    let resolution = locator.locate_kind(ResourceKind::Cmip7Metadata, None, None);

    assert_eq!(resolution.path(), None);
    assert!(!roots.cache.join("cmip7_metadata/v1.2.2.2/metadata.json").as_std_path().exists());
    assert_matches!(
        resolution.into_result(),
        Err(CmorError::ResolutionExhausted { resource, attempted })
            if resource == "cmip7_metadata" && attempted.len() == 2
    );
}

/// Writes a generated metadata file; optionally lets another writer publish
/// first while the fetch is running.
#[derive(Default)]
struct MetadataFetcher {
    calls: Mutex<usize>,
    concurrent_entry: Option<Utf8PathBuf>,
}

impl RemoteFetcher for MetadataFetcher {
    fn fetch(
        &self,
        _source: &RemoteSource,
        version: &str,
        destination: &Utf8Path,
    ) -> Result<(), CmorError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(entry) = &self.concurrent_entry {
            write(entry, r#"{"Header": {"writer": "other"}}"#);
        }
        write(
            destination,
            &format!(r#"{{"Header": {{"dreq content version": "{version}"}}, "Compound Name": {{}}}}"#),
        );
        Ok(())
    }
}

fn metadata_locator(roots: &Roots, fetcher: MetadataFetcher) -> ResourceLocator<MetadataFetcher> {
    ResourceLocator::new(
        CacheStore::new_with_root(roots.cache.clone()),
        fetcher,
        PackagedResources::with_root(roots.data.clone()),
        VendoredResources::with_root(roots.vendor.clone()),
    )
}

#[test]
fn invalid_metadata_beside_other_files_is_refetched() {
    let roots = roots();
    let entry = roots.cache.join("cmip7_metadata/v1.2.2.2");
    write(&entry.join("metadata.json"), "{}");
    write(&entry.join("notes.txt"), "left by an earlier run");

    let locator = metadata_locator(&roots, MetadataFetcher::default());
    let found = locator
        .locate_kind(ResourceKind::Cmip7Metadata, None, None)
        .into_result()
        .unwrap();

    assert_eq!(found.tier, Tier::Remote);
    assert_eq!(found.path, entry.join("metadata.json"));
    assert_eq!(*locator.fetcher().calls.lock().unwrap(), 1);
    let content = fs::read_to_string(found.path.as_std_path()).unwrap();
    assert!(content.contains("v1.2.2.2"));
    assert!(entry.join("notes.txt").as_std_path().exists());

    let again = locator
        .locate_kind(ResourceKind::Cmip7Metadata, None, None)
        .into_result()
        .unwrap();
    assert_eq!(again.tier, Tier::Cache);
    assert_eq!(*locator.fetcher().calls.lock().unwrap(), 1);
}

#[test]
fn concurrently_published_metadata_is_kept() {
    let roots = roots();
    let cached = roots.cache.join("cmip7_metadata/v1.2.2.2/metadata.json");
    let fetcher = MetadataFetcher {
        calls: Mutex::new(0),
        concurrent_entry: Some(cached.clone()),
    };

    let locator = metadata_locator(&roots, fetcher);
    let found = locator
        .locate_kind(ResourceKind::Cmip7Metadata, None, None)
        .into_result()
        .unwrap();

    assert_eq!(found.path, cached);
    let content = fs::read_to_string(cached.as_std_path()).unwrap();
    assert!(content.contains(r#""writer": "other""#));
}

#[test]
fn concurrently_published_directory_is_kept() {
    let roots = roots();
    let entry = roots.cache.join("cmip6-cvs/6.2.58.64");

    struct RacingFetcher {
        entry: Utf8PathBuf,
    }

    impl RemoteFetcher for RacingFetcher {
        fn fetch(
            &self,
            _source: &RemoteSource,
            _version: &str,
            destination: &Utf8Path,
        ) -> Result<(), CmorError> {
            write(&self.entry.join("CMIP6_source_id.json"), r#"{"source_id": {}}"#);
            write(&destination.join("CMIP6_activity_id.json"), r#"{"activity_id": {}}"#);
            Ok(())
        }
    }

    let locator = ResourceLocator::new(
        CacheStore::new_with_root(roots.cache.clone()),
        RacingFetcher { entry: entry.clone() },
        PackagedResources::with_root(roots.data.clone()),
        VendoredResources::with_root(roots.vendor.clone()),
    );
    let found = locator
        .locate_kind(ResourceKind::Cmip6Cvs, None, None)
        .into_result()
        .unwrap();

    assert_eq!(found.path, entry);
    assert!(entry.join("CMIP6_source_id.json").as_std_path().exists());
    assert!(!entry.join("CMIP6_activity_id.json").as_std_path().exists());
}
