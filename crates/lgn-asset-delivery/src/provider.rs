use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tracing::debug;

use crate::{AssetDelivery, LoadOptions, Residency, Result};

/// Generic bundle fetch, the part of the loader this crate delegates to once
/// the bundle location is known.
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    type Bundle: Send;

    async fn fetch(&self, location: &str) -> anyhow::Result<Self::Bundle>;
}

/// Reads bundles from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileBundleFetcher {
    root: Option<PathBuf>,
}

impl FileBundleFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative locations are read under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

#[async_trait]
impl BundleFetcher for FileBundleFetcher {
    type Bundle = Vec<u8>;

    async fn fetch(&self, location: &str) -> anyhow::Result<Vec<u8>> {
        let path = match &self.root {
            Some(root) => root.join(location),
            None => PathBuf::from(location),
        };
        tokio::fs::read(&path)
            .await
            .map_err(|err| anyhow::anyhow!("failed to read bundle {}: {}", path.display(), err))
    }
}

/// Loads bundles, waiting for their asset pack first.
pub struct AssetBundleProvider<F> {
    delivery: Arc<AssetDelivery>,
    fetcher: F,
}

impl<F: BundleFetcher> AssetBundleProvider<F> {
    pub fn new(delivery: Arc<AssetDelivery>, fetcher: F) -> Self {
        Self { delivery, fetcher }
    }

    /// Loads the bundle behind `bundle_identifier`.
    ///
    /// # Errors
    ///
    /// `Error::Residency` if the owning pack could not be made resident,
    /// `Error::Fetch` if reading the bundle failed.
    pub async fn provide(&self, bundle_identifier: &str) -> Result<F::Bundle> {
        let residency = self.delivery.ensure_pack_resident(bundle_identifier).await?;
        self.fetch(bundle_identifier, &residency).await
    }

    /// Same as [`Self::provide`], bounded by `options`.
    ///
    /// # Errors
    ///
    /// See [`Self::provide`].
    pub async fn provide_with(
        &self,
        bundle_identifier: &str,
        options: &LoadOptions,
    ) -> Result<F::Bundle> {
        let residency = self
            .delivery
            .ensure_pack_resident_with(bundle_identifier, options)
            .await?;
        self.fetch(bundle_identifier, &residency).await
    }

    async fn fetch(&self, bundle_identifier: &str, residency: &Residency) -> Result<F::Bundle> {
        let location = self.delivery.resolve_bundle_location(bundle_identifier);
        if let Residency::Resident { pack_name, .. } = residency {
            debug!(
                "loading '{}' from asset pack '{}' at {}",
                bundle_identifier, pack_name, location
            );
        }
        Ok(self.fetcher.fetch(&location).await?)
    }
}
