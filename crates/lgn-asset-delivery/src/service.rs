//! Host platform asset-pack delivery interface.
//!
//! On device this is backed by the Play asset delivery API. The crate only
//! consumes it; [`EditorPackService`] serves packs from the local build
//! output when running in the editor.

use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::location::editor_pack_root;

/// Delivery state of an asset pack as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetPackState {
    Unknown,
    Pending,
    Downloading,
    Transferring,
    Completed,
    Failed,
    Canceled,
    WaitingForWifi,
    NotInstalled,
}

/// Error code attached to a status, mirrors the platform error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetPackErrorCode {
    NoError,
    AppUnavailable,
    PackUnavailable,
    InvalidRequest,
    DownloadNotFound,
    ApiNotAvailable,
    NetworkError,
    AccessDenied,
    InsufficientStorage,
    PlayStoreNotFound,
    NetworkUnrestricted,
    AppNotOwned,
    ConfirmationNotRequired,
    UnrecognizedInstallation,
    InternalError,
}

impl Default for AssetPackErrorCode {
    fn default() -> Self {
        Self::NoError
    }
}

impl AssetPackErrorCode {
    /// Whether the code means the delivery service itself is out of reach,
    /// as opposed to a failure of this particular transfer.
    pub fn is_service_unavailable(self) -> bool {
        matches!(
            self,
            Self::ApiNotAvailable
                | Self::PlayStoreNotFound
                | Self::AppUnavailable
                | Self::AppNotOwned
                | Self::UnrecognizedInstallation
        )
    }
}

/// One status update for an asset pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPackStatus {
    pub name: String,
    pub state: AssetPackState,
    pub error: AssetPackErrorCode,
    pub bytes_downloaded: u64,
    pub total_size: u64,
}

impl AssetPackStatus {
    pub fn new(name: impl Into<String>, state: AssetPackState) -> Self {
        Self {
            name: name.into(),
            state,
            error: AssetPackErrorCode::NoError,
            bytes_downloaded: 0,
            total_size: 0,
        }
    }

    #[must_use]
    pub fn with_error(mut self, error: AssetPackErrorCode) -> Self {
        self.error = error;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, bytes_downloaded: u64, total_size: u64) -> Self {
        self.bytes_downloaded = bytes_downloaded;
        self.total_size = total_size;
        self
    }
}

/// Callback through which the platform reports status updates.
pub type StatusSender = mpsc::UnboundedSender<AssetPackStatus>;

/// Asset pack delivery service of the host platform.
///
/// Implementations report progress asynchronously: `request_download` returns
/// immediately and pushes any number of [`AssetPackStatus`] into `on_status`.
pub trait AssetPackService: Send + Sync {
    /// Starts (or joins) the download of `pack_names`.
    fn request_download(&self, pack_names: &[String], on_status: StatusSender);

    /// Directory of an installed pack, `None` if it is not on device.
    fn pack_location(&self, pack_name: &str) -> Option<PathBuf>;

    /// Asks the user for permission to download over mobile data.
    fn request_mobile_data_consent(&self, on_result: oneshot::Sender<bool>);
}

/// Serves packs from the editor-local custom asset pack content directory.
///
/// A pack is considered installed when its content directory exists.
pub struct EditorPackService {
    content_root: PathBuf,
    pack_folder_suffix: String,
    assets_dir: PathBuf,
}

impl EditorPackService {
    pub fn new(
        content_root: impl AsRef<Path>,
        pack_folder_suffix: impl Into<String>,
        assets_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            content_root: content_root.as_ref().to_owned(),
            pack_folder_suffix: pack_folder_suffix.into(),
            assets_dir: assets_dir.as_ref().to_owned(),
        }
    }

    fn pack_root(&self, pack_name: &str) -> PathBuf {
        editor_pack_root(
            &self.content_root,
            pack_name,
            &self.pack_folder_suffix,
            &self.assets_dir,
        )
    }
}

impl AssetPackService for EditorPackService {
    fn request_download(&self, pack_names: &[String], on_status: StatusSender) {
        for pack_name in pack_names {
            let state = if self.pack_location(pack_name).is_some() {
                AssetPackState::Completed
            } else {
                debug!("no editor content for asset pack '{}'", pack_name);
                AssetPackState::NotInstalled
            };
            // The receiver may already be gone, nothing to report then.
            let _ = on_status.send(AssetPackStatus::new(pack_name.clone(), state));
        }
    }

    fn pack_location(&self, pack_name: &str) -> Option<PathBuf> {
        let root = self.pack_root(pack_name);
        root.is_dir().then(|| root)
    }

    fn request_mobile_data_consent(&self, on_result: oneshot::Sender<bool>) {
        let _ = on_result.send(true);
    }
}
