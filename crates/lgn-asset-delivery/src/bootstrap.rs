use std::{io, path::PathBuf, sync::Arc};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    AssetDeliveryConfig, AssetPackService, BundleLocationResolver, EditorLocationResolver,
    EditorPackService, Error, LoadOptions, LocationHook, Manifest, PackError, PackEvent, PackIndex,
    PlayerLocationResolver, Residency, ResidencyResolver, Result, RuntimeEnvironment,
};

/// Process startup step: reads the manifest, builds the [`PackIndex`] and
/// installs the location resolver.
///
/// A missing or corrupt manifest never aborts startup; the returned
/// [`AssetDelivery`] then runs without custom packs and every bundle loads
/// from its default location.
pub struct Bootstrap {
    config: AssetDeliveryConfig,
}

impl Bootstrap {
    pub fn new(config: AssetDeliveryConfig) -> Self {
        Self { config }
    }

    /// Runs the bootstrap for the configured environment.
    ///
    /// `service` is the platform delivery service used on device; the editor
    /// serves packs from the local build output instead.
    pub async fn run(self, service: Arc<dyn AssetPackService>) -> AssetDelivery {
        match self.config.environment {
            RuntimeEnvironment::Player => self.run_player(service).await,
            RuntimeEnvironment::Editor => self.run_editor().await,
        }
    }

    async fn run_player(&self, service: Arc<dyn AssetPackService>) -> AssetDelivery {
        let config = &self.config;
        let index = match load_index(&[config.player_manifest_path()]).await {
            Ok(index) => index,
            Err(err) => return self.degrade(&err),
        };

        let resolver = PlayerLocationResolver::new(Arc::clone(&index), config.layout.clone());
        self.assemble(index, Arc::new(resolver), service)
    }

    async fn run_editor(&self) -> AssetDelivery {
        let config = &self.config;
        let index = match load_index(&config.editor_manifest_paths).await {
            Ok(index) => index,
            Err(err) => return self.degrade(&err),
        };

        let resolver = EditorLocationResolver::new(
            Arc::clone(&index),
            &config.editor_pack_content_root,
            config.editor_pack_folder_suffix.clone(),
            &config.editor_pack_assets_dir,
            config.layout.clone(),
        );
        let service = EditorPackService::new(
            &config.editor_pack_content_root,
            config.editor_pack_folder_suffix.clone(),
            &config.editor_pack_assets_dir,
        );
        self.assemble(index, Arc::new(resolver), Arc::new(service))
    }

    fn assemble(
        &self,
        index: Arc<PackIndex>,
        resolver: Arc<dyn BundleLocationResolver>,
        service: Arc<dyn AssetPackService>,
    ) -> AssetDelivery {
        let residency = ResidencyResolver::new(index, service, self.config.event_capacity);

        if self.config.probe_resident_packs {
            let found = residency.probe_resident_packs();
            debug!("{} asset pack(s) already on device", found);
        }

        let hook = LocationHook::new();
        hook.install(resolver);

        AssetDelivery {
            hook: Arc::new(hook),
            residency: Some(residency),
            default_options: self.default_options(),
        }
    }

    fn degrade(&self, err: &Error) -> AssetDelivery {
        if self.config.log_warnings {
            warn!(
                "asset packs disabled, bundles load from their default locations: {}",
                err
            );
        } else {
            debug!("asset packs disabled: {}", err);
        }

        AssetDelivery {
            hook: Arc::new(LocationHook::new()),
            residency: None,
            default_options: self.default_options(),
        }
    }

    fn default_options(&self) -> LoadOptions {
        LoadOptions {
            timeout: self.config.load_timeout(),
            cancellation: None,
        }
    }
}

/// Reads the first manifest found among `candidates` and indexes it.
async fn load_index(candidates: &[PathBuf]) -> Result<Arc<PackIndex>> {
    for candidate in candidates {
        match Manifest::load(candidate).await {
            Ok(manifest) => {
                let index = PackIndex::build(&manifest)?;
                info!(
                    "loaded asset pack manifest {} ({} packs, {} bundles)",
                    candidate.display(),
                    manifest.entries().len(),
                    index.bundle_count()
                );
                return Ok(Arc::new(index));
            }
            Err(Error::IO(err)) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no asset pack manifest at {}", candidate.display());
            }
            Err(err) => return Err(err),
        }
    }

    Err(Error::ManifestNotFound(candidates.to_vec()))
}

/// Asset delivery context, obtained from [`Bootstrap::run`].
pub struct AssetDelivery {
    hook: Arc<LocationHook>,
    residency: Option<ResidencyResolver>,
    default_options: LoadOptions,
}

impl AssetDelivery {
    /// Whether bootstrap failed and custom packs are disabled.
    pub fn is_degraded(&self) -> bool {
        self.residency.is_none()
    }

    pub fn pack_index(&self) -> Option<&Arc<PackIndex>> {
        self.residency.as_ref().map(ResidencyResolver::index)
    }

    pub fn residency(&self) -> Option<&ResidencyResolver> {
        self.residency.as_ref()
    }

    /// The location hook, to hand to the generic bundle loader.
    pub fn location_resolver(&self) -> Arc<dyn BundleLocationResolver> {
        Arc::clone(&self.hook) as Arc<dyn BundleLocationResolver>
    }

    /// Rewrites `bundle_identifier` into the path to open.
    pub fn resolve_bundle_location(&self, bundle_identifier: &str) -> String {
        self.hook.resolve(bundle_identifier)
    }

    /// Waits until the pack owning `bundle_identifier` is on device, bounded
    /// by the configured default timeout.
    ///
    /// # Errors
    ///
    /// Returns the [`PackError`] the residency request failed with.
    pub async fn ensure_pack_resident(
        &self,
        bundle_identifier: &str,
    ) -> Result<Residency, PackError> {
        self.ensure_pack_resident_with(bundle_identifier, &self.default_options)
            .await
    }

    /// Waits until the pack owning `bundle_identifier` is on device.
    ///
    /// # Errors
    ///
    /// Returns the [`PackError`] the residency request failed with.
    pub async fn ensure_pack_resident_with(
        &self,
        bundle_identifier: &str,
        options: &LoadOptions,
    ) -> Result<Residency, PackError> {
        match &self.residency {
            Some(residency) => {
                residency
                    .ensure_pack_resident_with(bundle_identifier, options)
                    .await
            }
            None => Ok(Residency::NotOwned),
        }
    }

    /// Subscribes to download progress, `None` when custom packs are disabled.
    pub fn subscribe_to_pack_events(&self) -> Option<broadcast::Receiver<PackEvent>> {
        self.residency.as_ref().map(ResidencyResolver::subscribe)
    }
}
