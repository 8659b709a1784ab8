#![allow(dead_code)]

use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use lgn_asset_delivery::{
    AssetDelivery, AssetDeliveryConfig, AssetPackErrorCode, AssetPackService, AssetPackState,
    AssetPackStatus, Bootstrap, BundleToPackEntry, DeliveryType, Manifest, StatusSender,
};
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Scripted platform delivery service.
///
/// Download requests are recorded and their status channels kept so a test
/// can push status updates whenever it wants.
#[derive(Default)]
pub struct ScriptedPackService {
    requests: Mutex<Vec<Vec<String>>>,
    channels: Mutex<HashMap<String, StatusSender>>,
    locations: Mutex<HashMap<String, PathBuf>>,
    consent_requests: Mutex<Vec<oneshot::Sender<bool>>>,
}

impl ScriptedPackService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_location(self: Arc<Self>, pack_name: &str, path: impl Into<PathBuf>) -> Arc<Self> {
        self.set_location(pack_name, path);
        self
    }

    pub fn set_location(&self, pack_name: &str, path: impl Into<PathBuf>) {
        self.locations
            .lock()
            .insert(pack_name.to_owned(), path.into());
    }

    /// Total number of `request_download` calls.
    pub fn download_requests(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn download_requests_for(&self, pack_name: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|names| names.iter().any(|name| name == pack_name))
            .count()
    }

    pub fn consent_requests(&self) -> usize {
        self.consent_requests.lock().len()
    }

    pub fn push(&self, status: AssetPackStatus) {
        let channels = self.channels.lock();
        let sender = channels
            .get(&status.name)
            .expect("no download requested for this pack");
        sender.send(status).expect("status receiver dropped");
    }

    pub fn push_state(&self, pack_name: &str, state: AssetPackState) {
        self.push(AssetPackStatus::new(pack_name, state));
    }

    pub fn fail(&self, pack_name: &str, error: AssetPackErrorCode) {
        self.push(AssetPackStatus::new(pack_name, AssetPackState::Failed).with_error(error));
    }

    /// Makes the pack available at `path` and reports completion.
    pub fn complete(&self, pack_name: &str, path: impl Into<PathBuf>) {
        self.set_location(pack_name, path);
        self.push_state(pack_name, AssetPackState::Completed);
    }

    /// Drops the status channel of `pack_name` without a terminal status.
    pub fn hang_up(&self, pack_name: &str) {
        self.channels.lock().remove(pack_name);
    }

    /// Answers the oldest pending consent prompt.
    pub fn answer_consent(&self, granted: bool) {
        let sender = self.consent_requests.lock().remove(0);
        sender.send(granted).expect("consent receiver dropped");
    }
}

impl AssetPackService for ScriptedPackService {
    fn request_download(&self, pack_names: &[String], on_status: StatusSender) {
        self.requests.lock().push(pack_names.to_vec());
        let mut channels = self.channels.lock();
        for name in pack_names {
            channels.insert(name.clone(), on_status.clone());
        }
    }

    fn pack_location(&self, pack_name: &str) -> Option<PathBuf> {
        self.locations.lock().get(pack_name).cloned()
    }

    fn request_mobile_data_consent(&self, on_result: oneshot::Sender<bool>) {
        self.consent_requests.lock().push(on_result);
    }
}

pub fn sample_manifest() -> Manifest {
    Manifest::new(vec![
        BundleToPackEntry::new("Gfx", DeliveryType::FastFollow, ["tex_atlas", "ui"]),
        BundleToPackEntry::new("Audio", DeliveryType::OnDemand, ["music"]),
        BundleToPackEntry::new("Base", DeliveryType::InstallTime, ["core_shaders"]),
    ])
}

/// Writes `manifest` into a fresh streaming assets directory and bootstraps
/// a player against `service`.
pub async fn player_delivery(
    manifest: &Manifest,
    service: Arc<ScriptedPackService>,
) -> (tempfile::TempDir, AssetDelivery) {
    let streaming_assets = tempfile::tempdir().unwrap();
    let config = AssetDeliveryConfig {
        streaming_assets_dir: streaming_assets.path().to_owned(),
        ..AssetDeliveryConfig::default()
    };
    std::fs::write(
        config.player_manifest_path(),
        manifest.to_json_pretty().unwrap(),
    )
    .unwrap();

    let delivery = Bootstrap::new(config).run(service).await;
    assert!(!delivery.is_degraded());
    (streaming_assets, delivery)
}

/// Lets spawned tasks run until `condition` holds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached");
}
