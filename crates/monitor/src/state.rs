//! Snapshot state store
//!
//! One JSON file per monitored domain, replaced atomically on each scan via
//! write-to-temp plus rename. A corrupt or unreadable file is logged and
//! treated as "no prior state", never as a fatal error. An advisory lock
//! file forbids concurrent runs against the same state directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use watchtower_core::model::Snapshot;

pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create state directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// State file for a seed; dots become underscores so every seed maps to
    /// a distinct flat filename.
    fn state_file(&self, seed: &str) -> PathBuf {
        let safe_name = seed.replace('.', "_");
        self.dir.join(format!("{safe_name}_state.json"))
    }

    /// Load the previous snapshot; an empty snapshot on first scan or when
    /// the file is unreadable.
    pub fn load(&self, seed: &str) -> Snapshot {
        let path = self.state_file(seed);
        if !path.exists() {
            return Snapshot::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!(seed, error = %e, "corrupt snapshot, treating as no prior state");
                    Snapshot::default()
                }
            },
            Err(e) => {
                error!(seed, error = %e, "unreadable snapshot, treating as no prior state");
                Snapshot::default()
            }
        }
    }

    /// Atomically replace the snapshot for a seed.
    pub fn save(&self, seed: &str, snapshot: &Snapshot) -> Result<()> {
        let path = self.state_file(seed);
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(snapshot)?;
        fs::write(&tmp, content)
            .with_context(|| format!("failed to write snapshot temp file for {seed}"))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace snapshot for {seed}"))?;

        info!(seed, path = %path.display(), "snapshot saved");
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Advisory lock preventing concurrent runs on the same state directory.
/// Released on drop; a stale file from a crashed run must be removed by the
/// operator.
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(".watchtower.lock");
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                bail!(
                    "another run appears to be active (lock file {} exists)",
                    path.display()
                )
            }
            Err(e) => Err(e).context("failed to create lock file"),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use watchtower_core::model::Candidate;

    fn sample_snapshot() -> Snapshot {
        let mut candidate = Candidate::new("acme-loan.com", "homoglyph");
        candidate.dns_a = vec!["1.2.3.4".into()];
        candidate.dns_mx = vec!["mail.x".into()];
        candidate.recompute_registered();
        candidate.parked = Some(false);
        candidate.first_seen = Some(Utc::now());

        let mut snapshot = Snapshot {
            last_scan: Some(Utc::now()),
            ..Default::default()
        };
        snapshot
            .registered_domains
            .insert(candidate.domain.clone(), candidate);
        snapshot.total_registered = 1;
        snapshot
    }

    #[test]
    fn test_round_trip_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();

        let snapshot = sample_snapshot();
        store.save("acme.com", &snapshot).unwrap();
        let loaded = store.load("acme.com");
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_missing_state_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        let snapshot = store.load("acme.com");
        assert!(snapshot.is_first_scan());
        assert!(snapshot.registered_domains.is_empty());
    }

    #[test]
    fn test_corrupt_state_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();

        fs::write(dir.path().join("acme_com_state.json"), "{not json").unwrap();
        let snapshot = store.load("acme.com");
        assert!(snapshot.is_first_scan());
    }

    #[test]
    fn test_filename_collision_free() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();

        let snapshot = sample_snapshot();
        store.save("acme.com", &snapshot).unwrap();
        store.save("other.net", &Snapshot::default()).unwrap();

        // Distinct seeds land in distinct files and do not clobber.
        assert_eq!(store.load("acme.com"), snapshot);
        assert!(store.load("other.net").registered_domains.is_empty());
    }

    #[test]
    fn test_stale_temp_file_does_not_shadow_state() {
        // A crash between temp write and rename leaves the previous
        // snapshot intact.
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();

        let snapshot = sample_snapshot();
        store.save("acme.com", &snapshot).unwrap();
        fs::write(dir.path().join("acme_com_state.json.tmp"), "{garbage").unwrap();

        assert_eq!(store.load("acme.com"), snapshot);
    }

    #[test]
    fn test_run_lock_excludes_concurrent_runs() {
        let dir = tempfile::tempdir().unwrap();
        let lock = RunLock::acquire(dir.path()).unwrap();
        assert!(RunLock::acquire(dir.path()).is_err());
        drop(lock);
        assert!(RunLock::acquire(dir.path()).is_ok());
    }
}
