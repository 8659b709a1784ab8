use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::AssetPackErrorCode;

/// An error type for the asset-delivery crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("manifest is corrupt: {0}")]
    ManifestCorrupt(#[from] serde_json::Error),
    #[error("bundle '{bundle}' is listed in both '{first}' and '{second}' asset packs")]
    DuplicateBundle {
        bundle: String,
        first: String,
        second: String,
    },
    #[error("asset pack '{0}' is listed more than once in the manifest")]
    DuplicatePack(String),
    #[error("no manifest found, looked in: {0:?}")]
    ManifestNotFound(Vec<PathBuf>),
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Configuration(#[from] Box<figment::Error>),
    #[error("asset pack residency error: {0}")]
    Residency(#[from] PackError),
    #[error("bundle fetch error: {0}")]
    Fetch(#[from] anyhow::Error),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Configuration(Box::new(err))
    }
}

/// A result type that can be used to indicate errors.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Terminal failure of a pack residency request.
///
/// The same value is delivered to every caller waiting on the pack, hence
/// `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackError {
    /// The host delivery service cannot be reached, typically because the app
    /// was not installed through the store.
    #[error("asset delivery service unavailable for pack '{pack_name}' ({error:?})")]
    ServiceUnavailable {
        pack_name: String,
        error: AssetPackErrorCode,
    },

    /// The platform has no record of the pack.
    #[error("no asset pack named '{pack_name}' is available")]
    PackUnknown { pack_name: String },

    /// The transfer was canceled by the user or the system.
    #[error("download of asset pack '{pack_name}' was canceled")]
    DownloadCanceled { pack_name: String },

    /// The user declined to download over mobile data.
    #[error("mobile data consent denied for asset pack '{pack_name}'")]
    ConsentDenied { pack_name: String },

    /// The platform reported completion but no usable location.
    #[error("asset pack '{pack_name}' completed but the platform returned no local path")]
    PathMissing { pack_name: String },

    /// Any other explicit failure reported by the platform.
    #[error("download of asset pack '{pack_name}' failed ({error:?})")]
    DownloadFailed {
        pack_name: String,
        error: AssetPackErrorCode,
    },

    /// The platform dropped its status channel without a terminal status.
    #[error("status updates for asset pack '{pack_name}' stopped before completion")]
    StatusStreamClosed { pack_name: String },

    /// The caller-supplied timeout elapsed.
    #[error("timed out after {timeout:?} waiting for asset pack '{pack_name}'")]
    TimedOut { pack_name: String, timeout: Duration },

    /// The caller-supplied cancellation token fired.
    #[error("wait for asset pack '{pack_name}' was cancelled by the caller")]
    Cancelled { pack_name: String },
}

impl PackError {
    /// Name of the pack this failure relates to.
    pub fn pack_name(&self) -> &str {
        match self {
            Self::ServiceUnavailable { pack_name, .. }
            | Self::PackUnknown { pack_name }
            | Self::DownloadCanceled { pack_name }
            | Self::ConsentDenied { pack_name }
            | Self::PathMissing { pack_name }
            | Self::DownloadFailed { pack_name, .. }
            | Self::StatusStreamClosed { pack_name }
            | Self::TimedOut { pack_name, .. }
            | Self::Cancelled { pack_name } => pack_name,
        }
    }
}
