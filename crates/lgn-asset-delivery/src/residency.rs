//! Asset pack residency resolution.
//!
//! A request for a bundle goes through the following states:
//!
//! ```text
//! Unknown ──▶ NotOwned                         (bundle in no pack)
//!    │
//!    ├──────▶ Resolved                         (pack already on device)
//!    │
//!    └──────▶ Requesting ◀──▶ WaitingForConsent
//!                 │
//!                 ├──▶ Completed               (path recorded in the index)
//!                 └──▶ Failed
//! ```
//!
//! Concurrent requests for bundles of the same pack are coalesced: the first
//! one issues the platform download request and spawns a task driving the
//! status updates, later ones only register as waiters. When the download
//! reaches a terminal state the outcome is fanned out to every waiter.
//! Failures are not cached, the next request starts over.

use std::{
    collections::{hash_map::Entry, HashMap},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    location::owning_pack, AssetPackErrorCode, AssetPackService, AssetPackState, AssetPackStatus,
    PackError, PackIndex,
};

/// Where a bundle can be loaded from once residency is settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Residency {
    /// The bundle belongs to no asset pack, load it from its default location.
    NotOwned,
    /// The owning pack is on device.
    Resident { pack_name: String, path: PathBuf },
}

/// Per-call options of a residency request.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Give up waiting after this long.
    pub timeout: Option<Duration>,
    /// Give up waiting when this token is cancelled.
    pub cancellation: Option<CancellationToken>,
}

impl LoadOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Notification about the progress of asset pack downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackEvent {
    Progress {
        pack_name: String,
        state: AssetPackState,
        bytes_downloaded: u64,
        total_size: u64,
    },
    WaitingForConsent {
        pack_name: String,
    },
    Resolved {
        pack_name: String,
        path: PathBuf,
    },
    Failed {
        pack_name: String,
        error: PackError,
    },
}

type Waiter = oneshot::Sender<Result<PathBuf, PackError>>;

/// Callers waiting on one in-flight platform request.
struct PendingFetch {
    waiters: Vec<Waiter>,
}

struct Inner {
    index: Arc<PackIndex>,
    service: Arc<dyn AssetPackService>,
    pending: Mutex<HashMap<String, PendingFetch>>,
    events: broadcast::Sender<PackEvent>,
}

/// Makes sure the asset pack owning a bundle is on device before the bundle
/// is loaded.
#[derive(Clone)]
pub struct ResidencyResolver {
    inner: Arc<Inner>,
}

impl ResidencyResolver {
    pub fn new(
        index: Arc<PackIndex>,
        service: Arc<dyn AssetPackService>,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                index,
                service,
                pending: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn index(&self) -> &Arc<PackIndex> {
        &self.inner.index
    }

    /// Subscribes to download progress notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PackEvent> {
        self.inner.events.subscribe()
    }

    /// Number of packs with a download in flight.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Number of callers waiting on the in-flight download of `pack_name`.
    pub fn waiter_count(&self, pack_name: &str) -> usize {
        self.inner
            .pending
            .lock()
            .get(pack_name)
            .map_or(0, |fetch| {
                fetch
                    .waiters
                    .iter()
                    .filter(|waiter| !waiter.is_closed())
                    .count()
            })
    }

    /// Probes the platform for packs already on device and records them.
    ///
    /// Returns the number of packs found.
    pub fn probe_resident_packs(&self) -> usize {
        let index = &self.inner.index;
        let mut found = 0;
        for pack in index.packs() {
            if index.is_resolved(&pack.pack_name) {
                continue;
            }
            if let Some(path) = self.inner.local_path(&pack.pack_name) {
                index.record_resolved(&pack.pack_name, path);
                found += 1;
            } else if pack.delivery_type.is_install_time() {
                warn!(
                    "install-time asset pack '{}' is not on device",
                    pack.pack_name
                );
            }
        }
        found
    }

    /// Waits until the pack owning `bundle_identifier` is on device.
    ///
    /// # Errors
    ///
    /// Returns the [`PackError`] the download terminated with.
    pub async fn ensure_pack_resident(
        &self,
        bundle_identifier: &str,
    ) -> Result<Residency, PackError> {
        self.ensure_pack_resident_with(bundle_identifier, &LoadOptions::default())
            .await
    }

    /// Same as [`Self::ensure_pack_resident`], bounded by `options`.
    ///
    /// A timeout or cancellation only affects this caller, the download keeps
    /// running for the other waiters.
    ///
    /// # Errors
    ///
    /// Returns the [`PackError`] the download terminated with, or
    /// `PackError::TimedOut` / `PackError::Cancelled`.
    pub async fn ensure_pack_resident_with(
        &self,
        bundle_identifier: &str,
        options: &LoadOptions,
    ) -> Result<Residency, PackError> {
        let pack = match owning_pack(&self.inner.index, bundle_identifier) {
            Some(pack) => pack,
            None => return Ok(Residency::NotOwned),
        };
        let pack_name = pack.pack_name.clone();

        let receiver = match self.attach(&pack_name) {
            Attached::Resident(path) => return Ok(Residency::Resident { pack_name, path }),
            Attached::Waiting(receiver) => receiver,
        };

        let path = wait_for(&pack_name, receiver, options).await?;
        Ok(Residency::Resident { pack_name, path })
    }

    fn attach(&self, pack_name: &str) -> Attached {
        let inner = &self.inner;
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = inner.pending.lock();

            if let Some(path) = inner.index.resolved_path(pack_name) {
                return Attached::Resident(path);
            }

            match pending.entry(pack_name.to_owned()) {
                Entry::Occupied(mut fetch) => {
                    debug!("joining in-flight download of asset pack '{}'", pack_name);
                    let waiters = &mut fetch.get_mut().waiters;
                    // Drop callers that timed out or were cancelled.
                    waiters.retain(|waiter| !waiter.is_closed());
                    waiters.push(tx);
                    return Attached::Waiting(rx);
                }
                Entry::Vacant(slot) => {
                    // The pack may have landed since the last probe.
                    if let Some(path) = inner.local_path(pack_name) {
                        inner.index.record_resolved(pack_name, &path);
                        return Attached::Resident(path);
                    }
                    slot.insert(PendingFetch { waiters: vec![tx] });
                }
            }
        }

        info!("requesting download of asset pack '{}'", pack_name);
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        tokio::spawn(Arc::clone(inner).drive(pack_name.to_owned(), status_rx));
        inner
            .service
            .request_download(&[pack_name.to_owned()], status_tx);

        Attached::Waiting(rx)
    }
}

enum Attached {
    Resident(PathBuf),
    Waiting(oneshot::Receiver<Result<PathBuf, PackError>>),
}

/// Next thing the download driver reacts to.
enum Step {
    Status(Option<AssetPackStatus>),
    Consent(bool),
}

async fn wait_for(
    pack_name: &str,
    receiver: oneshot::Receiver<Result<PathBuf, PackError>>,
    options: &LoadOptions,
) -> Result<PathBuf, PackError> {
    let settled = async move {
        let outcome = match options.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, receiver).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => {
                    debug!("timed out waiting for asset pack '{}'", pack_name);
                    return Err(PackError::TimedOut {
                        pack_name: pack_name.to_owned(),
                        timeout,
                    });
                }
            },
            None => receiver.await,
        };
        // The driver always settles its waiters, a dropped sender means it died.
        outcome.unwrap_or_else(|_closed| {
            Err(PackError::StatusStreamClosed {
                pack_name: pack_name.to_owned(),
            })
        })
    };

    match &options.cancellation {
        Some(token) => tokio::select! {
            outcome = settled => outcome,
            _ = token.cancelled() => {
                debug!("wait for asset pack '{}' cancelled by caller", pack_name);
                Err(PackError::Cancelled { pack_name: pack_name.to_owned() })
            }
        },
        None => settled.await,
    }
}

impl Inner {
    fn local_path(&self, pack_name: &str) -> Option<PathBuf> {
        self.service
            .pack_location(pack_name)
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Consumes the status updates of one download until a terminal state.
    async fn drive(
        self: Arc<Self>,
        pack_name: String,
        mut status_rx: mpsc::UnboundedReceiver<AssetPackStatus>,
    ) {
        let outcome = self.follow(&pack_name, &mut status_rx).await;
        self.settle(&pack_name, outcome);
    }

    async fn follow(
        &self,
        pack_name: &str,
        status_rx: &mut mpsc::UnboundedReceiver<AssetPackStatus>,
    ) -> Result<PathBuf, PackError> {
        let mut consent: Option<oneshot::Receiver<bool>> = None;
        let mut consent_granted = false;

        loop {
            // Statuses already queued win over the consent answer.
            let step = match consent.as_mut() {
                Some(reply) => tokio::select! {
                    biased;
                    status = status_rx.recv() => Step::Status(status),
                    granted = reply => Step::Consent(granted.unwrap_or(false)),
                },
                None => Step::Status(status_rx.recv().await),
            };

            let status = match step {
                Step::Status(Some(status)) => status,
                Step::Status(None) => break,
                Step::Consent(granted) => {
                    consent = None;
                    if !granted {
                        error!(
                            "user declined mobile data download of asset pack '{}'",
                            pack_name
                        );
                        return Err(PackError::ConsentDenied {
                            pack_name: pack_name.to_owned(),
                        });
                    }
                    info!(
                        "mobile data download of asset pack '{}' approved",
                        pack_name
                    );
                    consent_granted = true;
                    continue;
                }
            };

            if status.name != pack_name {
                debug!(
                    "ignoring status of asset pack '{}' while downloading '{}'",
                    status.name, pack_name
                );
                continue;
            }

            match status.state {
                AssetPackState::Pending
                | AssetPackState::Downloading
                | AssetPackState::Transferring => {
                    let _ = self.events.send(PackEvent::Progress {
                        pack_name: pack_name.to_owned(),
                        state: status.state,
                        bytes_downloaded: status.bytes_downloaded,
                        total_size: status.total_size,
                    });
                }
                AssetPackState::WaitingForWifi => {
                    if consent_granted || consent.is_some() {
                        debug!(
                            "asset pack '{}' still waiting for wifi, consent already requested",
                            pack_name
                        );
                        continue;
                    }
                    let _ = self.events.send(PackEvent::WaitingForConsent {
                        pack_name: pack_name.to_owned(),
                    });
                    consent = Some(self.request_consent(pack_name));
                }
                AssetPackState::Completed => {
                    return match self.local_path(pack_name) {
                        Some(path) => Ok(path),
                        None => {
                            error!(
                                "asset pack '{}' downloaded but the platform reports no location",
                                pack_name
                            );
                            Err(PackError::PathMissing {
                                pack_name: pack_name.to_owned(),
                            })
                        }
                    };
                }
                AssetPackState::Failed => return Err(failure(pack_name, status.error)),
                AssetPackState::Unknown | AssetPackState::NotInstalled => {
                    error!("no asset pack named '{}' is available", pack_name);
                    return Err(PackError::PackUnknown {
                        pack_name: pack_name.to_owned(),
                    });
                }
                AssetPackState::Canceled => {
                    error!("download of asset pack '{}' was canceled", pack_name);
                    return Err(PackError::DownloadCanceled {
                        pack_name: pack_name.to_owned(),
                    });
                }
            }
        }

        error!(
            "status updates for asset pack '{}' stopped before completion",
            pack_name
        );
        Err(PackError::StatusStreamClosed {
            pack_name: pack_name.to_owned(),
        })
    }

    /// Asks the user for mobile data consent, a dropped answer is a denial.
    fn request_consent(&self, pack_name: &str) -> oneshot::Receiver<bool> {
        debug!("asking for mobile data consent for asset pack '{}'", pack_name);
        let (tx, rx) = oneshot::channel();
        self.service.request_mobile_data_consent(tx);
        rx
    }

    fn settle(&self, pack_name: &str, outcome: Result<PathBuf, PackError>) {
        let waiters = {
            let mut pending = self.pending.lock();
            if let Ok(path) = &outcome {
                self.index.record_resolved(pack_name, path);
            }
            pending
                .remove(pack_name)
                .map(|fetch| fetch.waiters)
                .unwrap_or_default()
        };

        let event = match &outcome {
            Ok(path) => PackEvent::Resolved {
                pack_name: pack_name.to_owned(),
                path: path.clone(),
            },
            Err(error) => PackEvent::Failed {
                pack_name: pack_name.to_owned(),
                error: error.clone(),
            },
        };
        let _ = self.events.send(event);

        debug!(
            "settling {} waiter(s) of asset pack '{}'",
            waiters.len(),
            pack_name
        );
        for waiter in waiters {
            // Waiters that timed out or were cancelled are gone already.
            let _ = waiter.send(outcome.clone());
        }
    }
}

fn failure(pack_name: &str, error: AssetPackErrorCode) -> PackError {
    let pack_name = pack_name.to_owned();
    if error.is_service_unavailable() {
        error!(
            "asset delivery service unavailable while fetching '{}': {:?}",
            pack_name, error
        );
        PackError::ServiceUnavailable { pack_name, error }
    } else {
        error!("download of asset pack '{}' failed: {:?}", pack_name, error);
        PackError::DownloadFailed { pack_name, error }
    }
}
