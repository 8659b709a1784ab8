//! Bundle location rewriting.
//!
//! The generic bundle loader calls a [`BundleLocationResolver`] right before
//! opening a bundle. Bundles owned by a custom asset pack are redirected to
//! the pack's directory; everything else passes through untouched.
//!
//! A bundle of a resolved pack lives at
//! `<pack root>/<platform folder>/<bundle file name>`, see [`PackLayout`].
//! The same convention is used by the build pipeline when it lays out the
//! packs, both sides must agree on it.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{BundleToPackEntry, PackIndex};

/// Rewrites a bundle identifier into the path the loader should open.
pub trait BundleLocationResolver: Send + Sync {
    /// Never fails: identifiers it knows nothing about are returned as is.
    fn resolve(&self, bundle_identifier: &str) -> String;
}

/// File name part of a bundle identifier (directories stripped).
pub fn bundle_file_name(bundle_identifier: &str) -> &str {
    bundle_identifier
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(bundle_identifier)
}

/// Bundle name of an identifier: directories and extension stripped.
pub fn bundle_name(bundle_identifier: &str) -> &str {
    let file_name = bundle_file_name(bundle_identifier);
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// Finds the pack owning the bundle behind `bundle_identifier`.
///
/// The manifest normally lists bundle names without extension, but the full
/// file name is accepted as well.
pub(crate) fn owning_pack(
    index: &PackIndex,
    bundle_identifier: &str,
) -> Option<Arc<BundleToPackEntry>> {
    index
        .lookup(bundle_name(bundle_identifier))
        .or_else(|| index.lookup(bundle_file_name(bundle_identifier)))
}

/// Relative layout of bundles inside an asset pack.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PackLayout {
    /// Platform folder the bundles are built into.
    pub platform_dir: String,
    /// Texture compression variant, if the build produced one per format.
    pub texture_compression: Option<String>,
}

impl Default for PackLayout {
    fn default() -> Self {
        Self {
            platform_dir: "Android".to_owned(),
            texture_compression: None,
        }
    }
}

impl PackLayout {
    /// Name of the folder holding the bundles, `Android` or
    /// `Android#tcf_astc` for a texture compression variant.
    pub fn platform_folder(&self) -> String {
        match &self.texture_compression {
            Some(format) => format!("{}#tcf_{}", self.platform_dir, format),
            None => self.platform_dir.clone(),
        }
    }

    /// Location of `file_name` under `pack_root`.
    pub fn bundle_path(&self, pack_root: impl AsRef<Path>, file_name: &str) -> PathBuf {
        pack_root
            .as_ref()
            .join(self.platform_folder())
            .join(file_name)
    }
}

/// On-device resolver, redirects bundles of resolved packs to the directory
/// reported by the platform.
pub struct PlayerLocationResolver {
    index: Arc<PackIndex>,
    layout: PackLayout,
}

impl PlayerLocationResolver {
    pub fn new(index: Arc<PackIndex>, layout: PackLayout) -> Self {
        Self { index, layout }
    }
}

impl BundleLocationResolver for PlayerLocationResolver {
    fn resolve(&self, bundle_identifier: &str) -> String {
        let pack = match owning_pack(&self.index, bundle_identifier) {
            Some(pack) => pack,
            None => return bundle_identifier.to_owned(),
        };

        match self.index.resolved_path(&pack.pack_name) {
            Some(root) => self
                .layout
                .bundle_path(root, bundle_file_name(bundle_identifier))
                .to_string_lossy()
                .into_owned(),
            None => {
                // Loads of pack bundles must go through the residency resolver first.
                warn!(
                    "bundle '{}' requested before asset pack '{}' was resolved",
                    bundle_identifier, pack.pack_name
                );
                bundle_identifier.to_owned()
            }
        }
    }
}

/// Editor resolver, redirects pack bundles to the local custom asset pack
/// content directory produced by the build.
pub struct EditorLocationResolver {
    index: Arc<PackIndex>,
    content_root: PathBuf,
    pack_folder_suffix: String,
    assets_dir: PathBuf,
    layout: PackLayout,
}

impl EditorLocationResolver {
    pub fn new(
        index: Arc<PackIndex>,
        content_root: impl AsRef<Path>,
        pack_folder_suffix: impl Into<String>,
        assets_dir: impl AsRef<Path>,
        layout: PackLayout,
    ) -> Self {
        Self {
            index,
            content_root: content_root.as_ref().to_owned(),
            pack_folder_suffix: pack_folder_suffix.into(),
            assets_dir: assets_dir.as_ref().to_owned(),
            layout,
        }
    }

    /// Root of the editor-local content of `pack_name`.
    pub fn pack_root(&self, pack_name: &str) -> PathBuf {
        editor_pack_root(
            &self.content_root,
            pack_name,
            &self.pack_folder_suffix,
            &self.assets_dir,
        )
    }
}

pub(crate) fn editor_pack_root(
    content_root: &Path,
    pack_name: &str,
    pack_folder_suffix: &str,
    assets_dir: &Path,
) -> PathBuf {
    content_root
        .join(format!("{}{}", pack_name, pack_folder_suffix))
        .join(assets_dir)
}

impl BundleLocationResolver for EditorLocationResolver {
    fn resolve(&self, bundle_identifier: &str) -> String {
        match owning_pack(&self.index, bundle_identifier) {
            Some(pack) => self
                .layout
                .bundle_path(
                    self.pack_root(&pack.pack_name),
                    bundle_file_name(bundle_identifier),
                )
                .to_string_lossy()
                .into_owned(),
            None => bundle_identifier.to_owned(),
        }
    }
}

/// Single-slot override point of the generic bundle loader.
///
/// Empty until bootstrap installs a resolver; an empty hook passes every
/// identifier through.
#[derive(Default)]
pub struct LocationHook {
    slot: RwLock<Option<Arc<dyn BundleLocationResolver>>>,
}

impl LocationHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `resolver`, replacing any previous one.
    pub fn install(&self, resolver: Arc<dyn BundleLocationResolver>) {
        if self.slot.write().replace(resolver).is_some() {
            debug!("replacing installed bundle location resolver");
        }
    }

    pub fn is_installed(&self) -> bool {
        self.slot.read().is_some()
    }
}

impl BundleLocationResolver for LocationHook {
    fn resolve(&self, bundle_identifier: &str) -> String {
        match self.slot.read().as_ref() {
            Some(resolver) => resolver.resolve(bundle_identifier),
            None => bundle_identifier.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeliveryType, Manifest};

    fn index() -> Arc<PackIndex> {
        let manifest = Manifest::new(vec![
            BundleToPackEntry::new("Gfx", DeliveryType::FastFollow, ["tex_atlas"]),
            BundleToPackEntry::new("Audio", DeliveryType::OnDemand, ["music.bundle"]),
        ]);
        Arc::new(PackIndex::build(&manifest).unwrap())
    }

    #[test]
    fn bundle_names() {
        assert_eq!(bundle_file_name("aa/Android/tex_atlas.bundle"), "tex_atlas.bundle");
        assert_eq!(bundle_file_name(r"aa\Android\tex_atlas.bundle"), "tex_atlas.bundle");
        assert_eq!(bundle_file_name("tex_atlas"), "tex_atlas");
        assert_eq!(bundle_name("jar:file:///base.apk!/assets/aa/Android/ui.bundle"), "ui");
        assert_eq!(bundle_name("tex_atlas"), "tex_atlas");
        assert_eq!(bundle_name(".hidden"), ".hidden");
    }

    #[test]
    fn platform_folder() {
        let mut layout = PackLayout::default();
        assert_eq!(layout.platform_folder(), "Android");

        layout.texture_compression = Some("astc".to_owned());
        assert_eq!(layout.platform_folder(), "Android#tcf_astc");
        assert_eq!(
            layout.bundle_path("/data/packs/Gfx", "tex_atlas.bundle"),
            PathBuf::from("/data/packs/Gfx/Android#tcf_astc/tex_atlas.bundle")
        );
    }

    #[test]
    fn player_resolver_passes_through_unowned_bundles() {
        let resolver = PlayerLocationResolver::new(index(), PackLayout::default());

        for id in ["core.bundle", "aa/Android/other.bundle", ""] {
            assert_eq!(resolver.resolve(id), id);
        }
    }

    #[test]
    fn player_resolver_rewrites_resolved_packs() {
        let index = index();
        let resolver = PlayerLocationResolver::new(Arc::clone(&index), PackLayout::default());

        assert_eq!(resolver.resolve("tex_atlas.bundle"), "tex_atlas.bundle");

        index.record_resolved("Gfx", "/data/packs/Gfx/");
        let first = resolver.resolve("tex_atlas.bundle");
        assert_eq!(first, "/data/packs/Gfx/Android/tex_atlas.bundle");
        assert_eq!(resolver.resolve("tex_atlas.bundle"), first);
        assert_eq!(
            resolver.resolve("{RuntimePath}/Android/tex_atlas.bundle"),
            first
        );

        index.record_resolved("Audio", "/data/packs/Audio");
        assert_eq!(
            resolver.resolve("music.bundle"),
            "/data/packs/Audio/Android/music.bundle"
        );
    }

    #[test]
    fn editor_resolver_targets_pack_content() {
        let resolver = EditorLocationResolver::new(
            index(),
            "Build/CustomAssetPackContent",
            ".androidpack",
            "src/main/assets",
            PackLayout::default(),
        );

        assert_eq!(
            resolver.resolve("tex_atlas.bundle"),
            "Build/CustomAssetPackContent/Gfx.androidpack/src/main/assets/Android/tex_atlas.bundle"
        );
        assert_eq!(resolver.resolve("core.bundle"), "core.bundle");
    }

    #[test]
    fn hook_is_single_slot() {
        let hook = LocationHook::new();
        assert!(!hook.is_installed());
        assert_eq!(hook.resolve("tex_atlas.bundle"), "tex_atlas.bundle");

        let index = index();
        index.record_resolved("Gfx", "/first");
        hook.install(Arc::new(PlayerLocationResolver::new(
            Arc::clone(&index),
            PackLayout::default(),
        )));
        assert_eq!(hook.resolve("tex_atlas.bundle"), "/first/Android/tex_atlas.bundle");

        hook.install(Arc::new(PlayerLocationResolver::new(
            index,
            PackLayout {
                platform_dir: "Android".to_owned(),
                texture_compression: Some("etc2".to_owned()),
            },
        )));
        assert!(hook.is_installed());
        assert_eq!(
            hook.resolve("tex_atlas.bundle"),
            "/first/Android#tcf_etc2/tex_atlas.bundle"
        );
    }
}
