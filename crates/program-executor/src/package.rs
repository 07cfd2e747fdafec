//! Content-addressed package cache
//!
//! Archives are fetched once per checksum into `<root>/.packages/<checksum>`.
//! A slot is populated through a private staging directory that is renamed
//! into place, so concurrent installs of the same package never observe a
//! half extracted slot. Within one process, fills of the same slot are
//! serialized so each checksum is fetched once.

use crate::error::InstallError;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tar::Archive;
use tracing::{debug, info};
use uuid::Uuid;

/// Directory under the agent root holding cache slots
pub const CACHE_DIR: &str = ".packages";

/// Package archive a program runs from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    /// Where the archive is downloaded from
    pub url: String,
    /// Archive file name
    pub name: String,
    /// Expected blake3 checksum, hex encoded
    pub checksum: String,
}

/// Source of package archives
pub trait PackageFetcher: Send + Sync {
    /// Write the archive for `package` to `dest`
    fn fetch(&self, package: &PackageRef, dest: &Path) -> Result<(), InstallError>;
}

/// Fetches archives over HTTP
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Create a fetcher with default agent settings
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageFetcher for HttpFetcher {
    fn fetch(&self, package: &PackageRef, dest: &Path) -> Result<(), InstallError> {
        let download_error = |reason: String| InstallError::Download {
            url: package.url.clone(),
            reason,
        };

        info!("Downloading {}", package.url);
        let mut response = self
            .agent
            .get(&package.url)
            .header("User-Agent", "hoist-agent")
            .call()
            .map_err(|e| download_error(e.to_string()))?;

        let mut file = File::create(dest)
            .map_err(|e| InstallError::io(format!("creating {}", dest.display()), e))?;
        io::copy(&mut response.body_mut().as_reader(), &mut file)
            .map_err(|e| download_error(e.to_string()))?;
        Ok(())
    }
}

/// Copies archives out of a local directory, keyed by archive name
#[derive(Debug, Clone)]
pub struct LocalDirFetcher {
    dir: PathBuf,
}

impl LocalDirFetcher {
    /// Serve archives from `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl PackageFetcher for LocalDirFetcher {
    fn fetch(&self, package: &PackageRef, dest: &Path) -> Result<(), InstallError> {
        let source = self.dir.join(&package.name);
        fs::copy(&source, dest).map_err(|e| InstallError::Download {
            url: source.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

/// Checksum-addressed archive store under an agent root
#[derive(Debug, Clone)]
pub struct PackageCache {
    dir: PathBuf,
}

impl PackageCache {
    /// Cache rooted at `<root_dir>/.packages`
    pub fn new(root_dir: &Path) -> Self {
        Self {
            dir: root_dir.join(CACHE_DIR),
        }
    }

    /// Slot path for a checksum
    pub fn slot(&self, checksum: &str) -> PathBuf {
        self.dir.join(checksum)
    }

    /// Make sure the slot for `package` is populated and return it.
    ///
    /// An existing slot is trusted as is. Otherwise the archive is fetched,
    /// verified and extracted into a staging dir which is then renamed to the
    /// slot. Losing the rename race to another installer counts as success.
    pub fn ensure(
        &self,
        package: &PackageRef,
        fetcher: &dyn PackageFetcher,
    ) -> Result<PathBuf, InstallError> {
        if !is_plain_segment(&package.checksum) {
            return Err(InstallError::InvalidPackage(format!(
                "checksum '{}' is not a valid cache key",
                package.checksum
            )));
        }

        let slot = self.slot(&package.checksum);
        let lock = slot_lock(&slot);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.exists() {
            debug!("Package {} cached at {}", package.name, slot.display());
            return Ok(slot);
        }

        fs::create_dir_all(&self.dir)
            .map_err(|e| InstallError::io(format!("creating {}", self.dir.display()), e))?;

        let nonce = Uuid::new_v4();
        let staging = self.dir.join(format!("{}.{}.tmp", package.checksum, nonce));
        let download = self.dir.join(format!("{}.{}.download", package.checksum, nonce));

        let staged = self.stage(package, fetcher, &download, &staging);
        let _ = fs::remove_file(&download);
        if let Err(e) = staged {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        match fs::rename(&staging, &slot) {
            Ok(()) => info!("Cached package {} at {}", package.name, slot.display()),
            Err(_) if slot.exists() => {
                debug!("Package {} cached concurrently, discarding staging", package.name);
                let _ = fs::remove_dir_all(&staging);
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(InstallError::io(format!("renaming into {}", slot.display()), e));
            }
        }
        Ok(slot)
    }

    fn stage(
        &self,
        package: &PackageRef,
        fetcher: &dyn PackageFetcher,
        download: &Path,
        staging: &Path,
    ) -> Result<(), InstallError> {
        fetcher.fetch(package, download)?;

        let actual = file_checksum(download)
            .map_err(|e| InstallError::io(format!("hashing {}", download.display()), e))?;
        if !actual.eq_ignore_ascii_case(&package.checksum) {
            return Err(InstallError::ChecksumMismatch {
                package: package.name.clone(),
                expected: package.checksum.clone(),
                actual,
            });
        }

        fs::create_dir_all(staging)
            .map_err(|e| InstallError::io(format!("creating {}", staging.display()), e))?;
        extract_targz(download, staging).map_err(|e| InstallError::Extract {
            package: package.name.clone(),
            reason: e.to_string(),
        })
    }
}

/// Serializes fills of one slot within this process
fn slot_lock(slot: &Path) -> Arc<Mutex<()>> {
    static SLOT_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
        LazyLock::new(Default::default);
    let mut locks = SLOT_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(slot.to_path_buf()).or_default().clone()
}

/// The single top-level directory inside a slot
pub fn package_dir(slot: &Path) -> Result<PathBuf, InstallError> {
    let bad_layout = |reason: String| InstallError::BadCacheLayout {
        slot: slot.to_path_buf(),
        reason,
    };

    let entries = fs::read_dir(slot)
        .map_err(|e| InstallError::io(format!("reading {}", slot.display()), e))?
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| InstallError::io(format!("reading {}", slot.display()), e))?;

    match entries.as_slice() {
        [entry] if entry.path().is_dir() => Ok(entry.path()),
        [entry] => Err(bad_layout(format!(
            "{} is not a directory",
            entry.file_name().to_string_lossy()
        ))),
        entries => Err(bad_layout(format!(
            "expected one top-level directory, found {} entries",
            entries.len()
        ))),
    }
}

/// Blake3 of a file, lowercase hex
pub fn file_checksum(path: &Path) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut reader = BufReader::new(File::open(path)?);
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

fn extract_targz(archive: &Path, dest: &Path) -> io::Result<()> {
    let decoder = GzDecoder::new(BufReader::new(File::open(archive)?));
    Archive::new(decoder).unpack(dest)
}

/// True when `segment` names exactly one ordinary path component
pub(crate) fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
