//! Runtime side of Play asset delivery custom asset packs.
//!
//! Content bundles can be shipped in Android asset packs delivered at
//! install time, right after install (fast-follow) or on demand. The build
//! pipeline writes a [`Manifest`] describing which bundles each pack owns;
//! at runtime this crate:
//!
//! - indexes the manifest ([`PackIndex`]),
//! - makes sure a bundle's pack is on device before it is loaded, downloading
//!   it through the platform [`AssetPackService`] when needed
//!   ([`ResidencyResolver`]),
//! - rewrites bundle identifiers into paths under the pack directory
//!   ([`BundleLocationResolver`]).
//!
//! ```no_run
//! # async fn run(service: std::sync::Arc<dyn lgn_asset_delivery::AssetPackService>) -> lgn_asset_delivery::Result<()> {
//! use std::sync::Arc;
//! use lgn_asset_delivery::{AssetBundleProvider, AssetDeliveryConfig, Bootstrap, FileBundleFetcher};
//!
//! let config = AssetDeliveryConfig::load()?;
//! let delivery = Arc::new(Bootstrap::new(config).run(service).await);
//! let provider = AssetBundleProvider::new(delivery, FileBundleFetcher::new());
//! let _bytes = provider.provide("tex_atlas.bundle").await?;
//! # Ok(())
//! # }
//! ```

// crate-specific lint exceptions:
//#![allow()]

mod bootstrap;
mod config;
mod errors;
pub mod location;
pub mod manifest;
mod pack_index;
mod provider;
mod residency;
mod service;

pub use bootstrap::{AssetDelivery, Bootstrap};
pub use config::{AssetDeliveryConfig, RuntimeEnvironment, DEFAULT_FILENAME};
pub use errors::{Error, PackError, Result};
pub use location::{
    BundleLocationResolver, EditorLocationResolver, LocationHook, PackLayout,
    PlayerLocationResolver,
};
pub use manifest::{BundleToPackEntry, DeliveryType, Manifest};
pub use pack_index::PackIndex;
pub use provider::{AssetBundleProvider, BundleFetcher, FileBundleFetcher};
pub use residency::{LoadOptions, PackEvent, Residency, ResidencyResolver};
pub use service::{
    AssetPackErrorCode, AssetPackService, AssetPackState, AssetPackStatus, EditorPackService,
    StatusSender,
};
