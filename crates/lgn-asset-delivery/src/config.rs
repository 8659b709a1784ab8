use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use crate::{PackLayout, Result};

/// The default filename for configuration files.
pub static DEFAULT_FILENAME: &str = "asset-delivery.toml";

/// Where the process runs, decides how the manifest is found and where pack
/// bundles are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeEnvironment {
    /// Packaged application on device.
    Player,
    /// Development environment, packs are read from the local build output.
    Editor,
}

impl Default for RuntimeEnvironment {
    fn default() -> Self {
        Self::Player
    }
}

/// The configuration of the asset delivery runtime.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetDeliveryConfig {
    pub environment: RuntimeEnvironment,

    /// Local streaming assets directory of the packaged application.
    pub streaming_assets_dir: PathBuf,
    pub manifest_file_name: String,

    /// Manifest candidates in the editor, tried in order.
    pub editor_manifest_paths: Vec<PathBuf>,
    pub editor_pack_content_root: PathBuf,
    pub editor_pack_folder_suffix: String,
    pub editor_pack_assets_dir: PathBuf,

    pub layout: PackLayout,

    /// Log bootstrap failures as warnings.
    pub log_warnings: bool,
    /// Look for packs already on device right after bootstrap.
    pub probe_resident_packs: bool,
    /// Default wait bound for residency requests, unbounded if unset.
    pub load_timeout_ms: Option<u64>,
    pub event_capacity: usize,
}

impl Default for AssetDeliveryConfig {
    fn default() -> Self {
        Self {
            environment: RuntimeEnvironment::default(),
            streaming_assets_dir: PathBuf::from("assets"),
            manifest_file_name: "CustomAssetPacksData.json".to_owned(),
            editor_manifest_paths: vec![
                PathBuf::from("Assets/PlayAssetDelivery/Build/CustomAssetPacksData.json"),
                PathBuf::from("Assets/StreamingAssets/CustomAssetPacksData.json"),
            ],
            editor_pack_content_root: PathBuf::from(
                "Assets/PlayAssetDelivery/Build/CustomAssetPackContent",
            ),
            editor_pack_folder_suffix: ".androidpack".to_owned(),
            editor_pack_assets_dir: PathBuf::from("src/main/assets"),
            layout: PackLayout::default(),
            log_warnings: true,
            probe_resident_packs: true,
            load_timeout_ms: None,
            event_capacity: 64,
        }
    }
}

impl AssetDeliveryConfig {
    /// The configuration section holding these settings.
    pub const SECTION: &'static str = "asset_delivery";

    /// Create a configuration from a TOML string.
    ///
    /// Useful for tests mostly.
    ///
    /// # Errors
    ///
    /// If the section is invalid, `Error::Configuration` is returned.
    pub fn from_toml(toml: &str) -> Result<Self> {
        Self::extract(&Figment::new().merge(Toml::string(toml)))
    }

    /// Load the configuration from all its various sources.
    ///
    /// If a configuration value is set in different sources, the value from
    /// the last read source will be used:
    ///
    /// - `/etc/legion-labs/asset-delivery.toml` on UNIX.
    /// - The closest `asset-delivery.toml` above the current binary.
    /// - The closest `asset-delivery.toml` above the current working
    ///   directory, unless it is the file already read.
    /// - `asset-delivery.toml` in the `legion-labs` user configuration
    ///   directory.
    /// - Any file specified in the `LGN_CONFIG` environment variable.
    /// - Environment variables, starting with `LGN_`.
    ///
    /// # Errors
    ///
    /// If the configuration cannot be loaded, an error is returned.
    pub fn load() -> Result<Self> {
        let path = std::env::current_dir()?;

        Self::load_with_current_directory(path)
    }

    /// Load the configuration, using the specified root as the current
    /// directory.
    ///
    /// See `load()` for more information.
    ///
    /// # Errors
    ///
    /// If the configuration cannot be loaded, an error is returned.
    pub fn load_with_current_directory(path: impl AsRef<Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if cfg!(unix) {
            figment = figment.merge(Toml::file(format!("/etc/legion-labs/{}", DEFAULT_FILENAME)));
        }

        let binary_path = std::env::current_exe()?;
        let known_path = binary_path
            .parent()
            .and_then(|dir| find_closest(dir, DEFAULT_FILENAME));

        if let Some(config_file_path) = &known_path {
            figment = figment.merge(Toml::file(config_file_path));
        }

        if let Some(config_file_path) = find_closest(path.as_ref(), DEFAULT_FILENAME) {
            if known_path.as_ref() != Some(&config_file_path) {
                figment = figment.merge(Toml::file(config_file_path));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_file_path = config_dir.join("legion-labs").join(DEFAULT_FILENAME);
            figment = figment.merge(Toml::file(config_file_path));
        }

        if let Some(config_file_path) = std::env::var_os("LGN_CONFIG") {
            figment = figment.merge(Toml::file(config_file_path));
        }

        let figment = figment.merge(Env::prefixed("LGN_"));

        Self::extract(&figment)
    }

    fn extract(figment: &Figment) -> Result<Self> {
        match figment.extract_inner(Self::SECTION) {
            Ok(config) => Ok(config),
            Err(err) => match &err.kind {
                figment::error::Kind::MissingField(missing_key) if missing_key == Self::SECTION => {
                    Ok(Self::default())
                }
                _ => Err(err.into()),
            },
        }
    }

    /// Manifest location of the packaged application.
    pub fn player_manifest_path(&self) -> PathBuf {
        self.streaming_assets_dir.join(&self.manifest_file_name)
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }
}

fn find_closest(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(file_name))
        .find(|candidate| std::fs::metadata(candidate).is_ok())
}
