//! Bundle to asset pack mapping written by the build pipeline.
//!
//! The manifest is a JSON document of the form:
//!
//! ```json
//! {
//!   "Entries": [
//!     { "AssetPackName": "Gfx", "DeliveryType": 2, "AssetBundles": ["tex_atlas"] }
//!   ]
//! }
//! ```

use std::{collections::BTreeSet, convert::TryFrom, path::Path};

use serde::{Deserialize, Serialize};

use crate::Result;

/// How an asset pack reaches the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DeliveryType {
    /// Not specified, handled like an install-time pack.
    #[default]
    None,
    /// Installed together with the application.
    InstallTime,
    /// Downloaded automatically right after installation.
    FastFollow,
    /// Downloaded when first requested.
    OnDemand,
}

impl DeliveryType {
    /// Whether the pack is expected to be on device as soon as the app is
    /// installed.
    pub fn is_install_time(self) -> bool {
        matches!(self, Self::None | Self::InstallTime)
    }
}

/// Delivery type integer outside of the known range.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid delivery type: {0}")]
pub struct InvalidDeliveryType(pub u8);

impl TryFrom<u8> for DeliveryType {
    type Error = InvalidDeliveryType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::InstallTime),
            2 => Ok(Self::FastFollow),
            3 => Ok(Self::OnDemand),
            other => Err(InvalidDeliveryType(other)),
        }
    }
}

impl From<DeliveryType> for u8 {
    fn from(delivery_type: DeliveryType) -> Self {
        match delivery_type {
            DeliveryType::None => 0,
            DeliveryType::InstallTime => 1,
            DeliveryType::FastFollow => 2,
            DeliveryType::OnDemand => 3,
        }
    }
}

/// One asset pack and the bundles it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleToPackEntry {
    /// Unique name of the asset pack.
    #[serde(rename = "AssetPackName")]
    pub pack_name: String,
    /// Delivery mode of the pack.
    #[serde(rename = "DeliveryType", default)]
    pub delivery_type: DeliveryType,
    /// Bundle names (without directory or extension) owned by the pack.
    #[serde(rename = "AssetBundles")]
    pub bundle_names: BTreeSet<String>,
}

impl BundleToPackEntry {
    /// Creates an entry, mostly useful for tests and tools.
    pub fn new<I, S>(pack_name: impl Into<String>, delivery_type: DeliveryType, bundles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pack_name: pack_name.into(),
            delivery_type,
            bundle_names: bundles.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered collection of [`BundleToPackEntry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "Entries")]
    entries: Vec<BundleToPackEntry>,
}

impl Manifest {
    /// Creates a manifest from its entries.
    pub fn new(entries: Vec<BundleToPackEntry>) -> Self {
        Self { entries }
    }

    /// Parses a manifest from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::ManifestCorrupt` if the bytes are not valid JSON, a
    /// required field is missing or a delivery type is out of range.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serializes the manifest as pretty printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::ManifestCorrupt` if serialization fails.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Reads and parses the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::IO` if the file cannot be read and
    /// `Error::ManifestCorrupt` if it cannot be parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        Self::from_json(&bytes)
    }

    pub fn entries(&self) -> &[BundleToPackEntry] {
        &self.entries
    }

    /// Finds the entry describing `pack_name`.
    pub fn pack(&self, pack_name: &str) -> Option<&BundleToPackEntry> {
        self.entries.iter().find(|entry| entry.pack_name == pack_name)
    }

    /// Total number of bundles across all packs.
    pub fn bundle_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.bundle_names.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
