//! Best-effort storage medium classification.
//!
//! Concurrent random reads wreck throughput on rotational and
//! network-attached storage, so the worker pool serializes hashing there.
//! Classification is advisory only: any probe failure degrades to
//! [`MediaKind::Unknown`], which is also treated as rotational.

use std::path::Path;

use sysinfo::{DiskKind, Disks};

/// Coarse storage classification of a scan root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Solid-state storage; parallel hashing is safe.
    Ssd,
    /// Rotational disk; hashing is serialized to avoid seek thrashing.
    Hdd,
    /// Network-attached share; treated like rotational media.
    Network,
    /// Probe failed or the volume was not recognized.
    Unknown,
}

impl MediaKind {
    /// Whether hashing work for this medium must run serialized.
    #[must_use]
    pub fn forces_serial(self) -> bool {
        !matches!(self, Self::Ssd)
    }

    /// Conservatism rank used when combining multiple roots.
    fn severity(self) -> u8 {
        match self {
            Self::Ssd => 0,
            Self::Unknown => 1,
            Self::Hdd => 2,
            Self::Network => 3,
        }
    }
}

/// Classify the storage medium backing `path`.
#[must_use]
pub fn classify(path: &Path) -> MediaKind {
    // UNC shares never show up in the local disk list
    if path.to_string_lossy().starts_with(r"\\") {
        return MediaKind::Network;
    }

    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();

    // Longest mount-point prefix wins: /home may be its own volume
    let mut best: Option<(usize, MediaKind)> = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if resolved.starts_with(mount) {
            let depth = mount.components().count();
            let kind = match disk.kind() {
                DiskKind::SSD => MediaKind::Ssd,
                DiskKind::HDD => MediaKind::Hdd,
                DiskKind::Unknown(_) => MediaKind::Unknown,
            };
            if best.is_none_or(|(d, _)| depth > d) {
                best = Some((depth, kind));
            }
        }
    }

    match best {
        Some((_, kind)) => kind,
        None => {
            log::debug!("no volume matched {}, medium unknown", path.display());
            MediaKind::Unknown
        }
    }
}

/// Classify a set of scan roots, taking the most conservative answer.
#[must_use]
pub fn classify_roots<P: AsRef<Path>>(roots: &[P]) -> MediaKind {
    roots
        .iter()
        .map(|root| classify(root.as_ref()))
        .max_by_key(|kind| kind.severity())
        .unwrap_or(MediaKind::Unknown)
}
