use std::{
    collections::{hash_map::Entry, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{BundleToPackEntry, Error, Manifest, Result};

/// Runtime lookup from bundle name to owning asset pack.
///
/// Built once from the [`Manifest`]. The bundle mapping is immutable; the set
/// of resolved pack locations only grows: once a pack is known to be on
/// device it is assumed to stay there for the lifetime of the process.
#[derive(Debug, Default)]
pub struct PackIndex {
    packs: HashMap<String, Arc<BundleToPackEntry>>,
    bundle_to_pack: HashMap<String, Arc<BundleToPackEntry>>,
    resolved: RwLock<HashMap<String, PathBuf>>,
}

impl PackIndex {
    /// Flattens `manifest` into a bundle lookup table.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicatePack` if a pack name is listed twice and
    /// `Error::DuplicateBundle` if a bundle is owned by two packs.
    pub fn build(manifest: &Manifest) -> Result<Self> {
        let mut packs = HashMap::with_capacity(manifest.entries().len());
        let mut bundle_to_pack = HashMap::with_capacity(manifest.bundle_count());

        for entry in manifest.entries() {
            let entry = Arc::new(entry.clone());

            match packs.entry(entry.pack_name.clone()) {
                Entry::Occupied(_) => return Err(Error::DuplicatePack(entry.pack_name.clone())),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&entry));
                }
            }

            for bundle in &entry.bundle_names {
                if let Some(previous) = bundle_to_pack.insert(bundle.clone(), Arc::clone(&entry)) {
                    return Err(Error::DuplicateBundle {
                        bundle: bundle.clone(),
                        first: previous.pack_name.clone(),
                        second: entry.pack_name.clone(),
                    });
                }
            }
        }

        debug!(
            "indexed {} bundles in {} asset packs",
            bundle_to_pack.len(),
            packs.len()
        );

        Ok(Self {
            packs,
            bundle_to_pack,
            resolved: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the pack owning `bundle_name`, if any.
    pub fn lookup(&self, bundle_name: &str) -> Option<Arc<BundleToPackEntry>> {
        self.bundle_to_pack.get(bundle_name).cloned()
    }

    pub fn pack(&self, pack_name: &str) -> Option<Arc<BundleToPackEntry>> {
        self.packs.get(pack_name).cloned()
    }

    pub fn packs(&self) -> impl Iterator<Item = &Arc<BundleToPackEntry>> {
        self.packs.values()
    }

    pub fn bundle_count(&self) -> usize {
        self.bundle_to_pack.len()
    }

    pub fn is_resolved(&self, pack_name: &str) -> bool {
        self.resolved.read().contains_key(pack_name)
    }

    /// On-device directory of a resolved pack.
    pub fn resolved_path(&self, pack_name: &str) -> Option<PathBuf> {
        self.resolved.read().get(pack_name).cloned()
    }

    /// Records that `pack_name` is resident at `path`.
    ///
    /// Recording the same pack twice is harmless; if the path changed the
    /// last one wins.
    pub fn record_resolved(&self, pack_name: &str, path: impl AsRef<Path>) {
        let path = path.as_ref();

        if !self.packs.contains_key(pack_name) {
            debug!("recording location of unindexed asset pack '{}'", pack_name);
        }

        let mut resolved = self.resolved.write();
        match resolved.insert(pack_name.to_owned(), path.to_owned()) {
            Some(previous) if previous.as_path() != path => {
                warn!(
                    "asset pack '{}' moved from {} to {}",
                    pack_name,
                    previous.display(),
                    path.display()
                );
            }
            Some(_) => {}
            None => debug!("asset pack '{}' resolved to {}", pack_name, path.display()),
        }
    }
}
