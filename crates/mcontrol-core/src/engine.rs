// ── Sync engine ──
//
// Owns the device and state tables and runs the two polling loops: a
// fast one against the local gateway and a slow one against the cloud.
// Both merge into the DataStore under the per-device rules documented on
// `DeviceState`. Control commands go through the cloud only, serialized
// with cloud polls by `cloud_gate`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mcontrol_api::local::UnitStatus;
use mcontrol_api::transport::{TlsMode, TransportConfig};
use mcontrol_api::{CloudClient, CloudDevice, LocalClient};

use crate::config::EngineConfig;
use crate::convert::{CloudReading, LocalReading, control_request, device_from_cloud, state_from_cloud};
use crate::error::CoreError;
use crate::mapping::{AddressMap, AddressMapper, Fingerprint, associate};
use crate::model::{
    CommandOutcome, ControlCommand, Device, DeviceState, EngineEvent, Freshness, HvacMode, Source,
    SyncState,
};
use crate::session::{RetryPolicy, SessionManager};
use crate::store::DataStore;
use crate::stream::StateStream;

const COMMAND_CHANNEL_SIZE: usize = 32;
const EVENT_CHANNEL_SIZE: usize = 256;

/// Consecutive local failures before mapped devices fall back to cloud.
pub const LOCAL_FAILURE_THRESHOLD: u32 = 3;

/// Consecutive cloud polls on which local telemetry must disagree with
/// the cloud before the address map is rebuilt.
const DISAGREEMENT_THRESHOLD: u32 = 2;

// ── EngineStatus ─────────────────────────────────────────────────

/// Engine lifecycle, observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Idle,
    Starting,
    Running,
    Stopped,
    /// Credentials were rejected; both loops are stopped.
    Failed,
}

/// Handle returned by [`SyncEngine::on_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

struct CommandEnvelope {
    cloud_id: String,
    command: ControlCommand,
    response_tx: oneshot::Sender<CommandOutcome>,
}

/// Bookkeeping shared by the loops. Only touched under a synchronous lock
/// with no await points.
#[derive(Default)]
struct Tracking {
    local_failures: u32,
    in_fallback: bool,
    /// Consecutive cloud polls disagreeing with local telemetry.
    disagreements: HashMap<String, u32>,
    /// Command fields awaiting confirmation by a cloud poll.
    pending: HashMap<String, ControlCommand>,
    /// Generation of the latest accepted command per device.
    last_command_gen: HashMap<String, u64>,
    /// Fingerprint from the latest cloud listing, used for remapping.
    cloud_prints: HashMap<String, Fingerprint>,
    /// Devices whose disagreement remap rebuilt the same pairing. They do
    /// not trigger another one until they agree with the cloud again.
    remap_settled: HashSet<String>,
}

// ── SyncEngine ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<EngineInner>`. [`start()`](Self::start)
/// authenticates, discovers devices, builds the address map and spawns the
/// background loops; [`stop()`](Self::stop) cancels them and keeps the last
/// merged state readable.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    session: SessionManager,
    local: Option<LocalClient>,
    store: Arc<DataStore>,
    status: watch::Sender<EngineStatus>,
    event_tx: broadcast::Sender<EngineEvent>,
    listeners: std::sync::Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    /// Warnings accumulated during start (partial map, gateway down).
    warnings: Mutex<Vec<String>>,
    tracking: std::sync::Mutex<Tracking>,
    /// Serializes control commands with cloud polls.
    cloud_gate: Mutex<()>,
    /// Bumped on every accepted command.
    generation: AtomicU64,
}

impl SyncEngine {
    /// Create an engine from configuration. Does NOT connect; call
    /// [`start()`](Self::start).
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        config.validate()?;

        let transport = build_transport(&config);
        let cloud = CloudClient::new(
            config.cloud_url.clone(),
            &transport.with_timeout(config.cloud_timeout),
        )?;
        let local = config
            .gateway
            .as_deref()
            .map(|host| LocalClient::new(host, &transport.with_timeout(config.local_timeout)))
            .transpose()?;

        let session = SessionManager::new(
            cloud,
            config.email.clone(),
            config.password.clone(),
            RetryPolicy {
                retries: config.cloud_retries,
                backoff: config.retry_backoff,
            },
        );

        let (status, _) = watch::channel(EngineStatus::Idle);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                session,
                local,
                store: Arc::new(DataStore::new()),
                status,
                event_tx,
                listeners: std::sync::Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
                warnings: Mutex::new(Vec::new()),
                tracking: std::sync::Mutex::new(Tracking::default()),
                cloud_gate: Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Authenticate, discover devices, map them to gateway slots and spawn
    /// the background loops.
    ///
    /// Rejected credentials fail with `AuthError::InvalidCredentials` and
    /// leave the engine `Failed` with no loop running. An unreachable
    /// gateway is not fatal: every device stays `CloudOnly` and a warning
    /// is recorded.
    pub async fn start(&self) -> Result<(), CoreError> {
        let claimed = self.inner.status.send_if_modified(|s| {
            if *s == EngineStatus::Idle {
                *s = EngineStatus::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            let status = *self.inner.status.borrow();
            return Err(CoreError::Internal(format!(
                "engine cannot start from state {status}"
            )));
        }

        if let Err(e) = self.setup().await {
            warn!(error = %e, "sync engine setup failed");
            self.inner.status.send_replace(EngineStatus::Failed);
            return Err(e);
        }

        self.spawn_tasks().await;
        self.inner.status.send_replace(EngineStatus::Running);
        info!(
            devices = self.inner.store.device_count(),
            mapped = self.inner.store.address_map().mapped_count(),
            "sync engine running"
        );
        Ok(())
    }

    /// Cancel the loops and wait for them to exit.
    ///
    /// In-flight requests are dropped. The last merged state stays
    /// readable.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        self.inner.status.send_modify(|s| {
            if *s != EngineStatus::Failed {
                *s = EngineStatus::Stopped;
            }
        });
        info!("sync engine stopped");
    }

    pub fn status(&self) -> EngineStatus {
        *self.inner.status.borrow()
    }

    /// Subscribe to lifecycle changes.
    pub fn status_updates(&self) -> watch::Receiver<EngineStatus> {
        self.inner.status.subscribe()
    }

    /// Replace the account credentials, clearing a rejection latch.
    pub fn update_credentials(&self, email: impl Into<String>, password: secrecy::SecretString) {
        self.inner.session.update_credentials(email, password);
    }

    // ── Collaborator interface ───────────────────────────────────

    /// Complete state snapshot for one device.
    pub fn get_snapshot(&self, cloud_id: &str) -> Option<Arc<DeviceState>> {
        self.inner.store.state(cloud_id)
    }

    /// Devices in cloud discovery order.
    pub fn get_discovered_devices(&self) -> Vec<Arc<Device>> {
        self.inner.store.devices_snapshot().as_ref().clone()
    }

    /// Reactive stream of full state snapshots.
    pub fn states(&self) -> StateStream {
        self.inner.store.subscribe_states()
    }

    /// Subscribe to the event broadcast channel.
    pub fn updates(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Register a callback invoked with every event.
    ///
    /// Callbacks run on the task that produced the event and must not
    /// block.
    pub fn on_update<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .push((id, Arc::new(callback)));
        id
    }

    /// Unregister a callback. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock().expect("listener lock poisoned");
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn address_map(&self) -> Arc<AddressMap> {
        self.inner.store.address_map()
    }

    /// Drain warnings accumulated during start.
    pub async fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.inner.warnings.lock().await)
    }

    /// `true` while mapped devices read from the cloud because the
    /// gateway keeps failing.
    pub fn in_fallback(&self) -> bool {
        self.tracking().in_fallback
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Send a control command through the cloud.
    ///
    /// Unknown devices, invalid commands and a stopped engine are errors.
    /// Otherwise the cloud's answer is the outcome: on `Accepted` the state
    /// has been updated optimistically and the next cloud poll reconciles
    /// it; a refusal or an outage yields `Rejected`.
    pub async fn set_command(
        &self,
        cloud_id: &str,
        command: ControlCommand,
    ) -> Result<CommandOutcome, CoreError> {
        self.ensure_running()?;

        let device = self
            .inner
            .store
            .device(cloud_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: cloud_id.to_owned(),
            })?;
        command.validate(&device.capabilities)?;

        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                cloud_id: device.cloud_id.clone(),
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::EngineStopped)?;

        rx.await.map_err(|_| CoreError::EngineStopped)
    }

    // ── Ticks ────────────────────────────────────────────────────

    /// One fast tick: poll the gateway and merge its telemetry.
    ///
    /// Every failure (unreachable, malformed JSON, protocol error) counts
    /// towards the fallback threshold. A slot set different from the one
    /// the map was built on triggers a remap first.
    pub async fn poll_local(&self) -> Result<(), CoreError> {
        self.ensure_running()?;
        let local = self.local_client()?;
        let started = self.inner.generation.load(Ordering::Acquire);

        let units = match local.poll_units().await {
            Ok(units) => units,
            Err(e) => {
                let err = CoreError::from(e);
                self.record_local_failure(&err);
                return Err(err);
            }
        };

        self.record_local_success();

        let slots: BTreeSet<u8> = units.keys().copied().collect();
        if &slots != self.inner.store.address_map().observed_slots() {
            info!(slots = ?slots, "gateway slot set changed, remapping");
            self.remap_from(&units);
        }

        self.merge_local(&units, started);
        Ok(())
    }

    /// One slow tick: list devices from the cloud and merge.
    ///
    /// Newly listed devices are added `CloudOnly`, vanished ones removed.
    /// A credential rejection stops the engine; any other failure marks
    /// devices unavailable and is returned.
    pub async fn poll_cloud(&self) -> Result<(), CoreError> {
        self.ensure_running()?;

        let disagreeing = {
            let _gate = self.inner.cloud_gate.lock().await;
            let listing = self
                .inner
                .session
                .call(|client, session| async move { client.list_devices(&session).await })
                .await;

            match listing {
                Ok(listing) => self.merge_cloud(&listing),
                Err(e) if e.is_credential_rejection() => {
                    self.fail_auth(&e);
                    return Err(e);
                }
                Err(e) => {
                    self.mark_unavailable(&e);
                    return Err(e);
                }
            }
        };

        if !disagreeing.is_empty() && self.inner.local.is_some() {
            if let Err(e) = self.remap_disagreeing(&disagreeing).await {
                warn!(error = %e, "remap failed");
            }
        }
        Ok(())
    }

    /// Poll the gateway and rebuild the address map.
    pub async fn remap(&self) -> Result<Arc<AddressMap>, CoreError> {
        self.ensure_running()?;
        let units = self.local_client()?.poll_units().await?;
        Ok(self.remap_from(&units))
    }

    // ── Private helpers ──────────────────────────────────────────

    fn tracking(&self) -> std::sync::MutexGuard<'_, Tracking> {
        self.inner.tracking.lock().expect("tracking lock poisoned")
    }

    fn ensure_running(&self) -> Result<(), CoreError> {
        match *self.inner.status.borrow() {
            EngineStatus::Running => Ok(()),
            _ => Err(CoreError::EngineStopped),
        }
    }

    fn local_client(&self) -> Result<&LocalClient, CoreError> {
        self.inner.local.as_ref().ok_or_else(|| CoreError::Config {
            message: "no local gateway configured".into(),
        })
    }

    fn emit(&self, event: EngineEvent) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in &listeners {
            listener(&event);
        }
        let _ = self.inner.event_tx.send(event);
    }

    fn emit_state(&self, state: Arc<DeviceState>) {
        self.emit(EngineEvent::StateChanged { state });
    }

    /// Update one state, emitting `StateChanged` if any visible value
    /// moved. Used for bookkeeping transitions, not for merges.
    fn update_state<F>(&self, cloud_id: &str, f: F)
    where
        F: FnOnce(&mut DeviceState),
    {
        let mut changed = false;
        let updated = self.inner.store.update_state(cloud_id, |s| {
            let before = s.clone();
            f(s);
            changed = !before.same_values(s);
        });
        if let Some(state) = updated.filter(|_| changed) {
            self.emit_state(state);
        }
    }

    async fn push_warning(&self, warning: String) {
        warn!("{warning}");
        self.inner.warnings.lock().await.push(warning);
    }

    /// Session, discovery and initial mapping.
    async fn setup(&self) -> Result<(), CoreError> {
        let listing = self
            .inner
            .session
            .call(|client, session| async move { client.list_devices(&session).await })
            .await?;

        let now = Utc::now();
        let mut discovered = Vec::with_capacity(listing.len());
        for d in &listing {
            let state = state_from_cloud(d, now);
            self.tracking()
                .cloud_prints
                .insert(d.id.clone(), Fingerprint::from_state(&state));
            discovered.push((d.id.clone(), state.clone()));
            self.inner.store.insert_device(device_from_cloud(d), state);
        }
        self.inner.store.mark_cloud_poll(now);
        info!(devices = discovered.len(), "discovered cloud devices");

        let map = match &self.inner.local {
            Some(local) => match AddressMapper::new(local.clone()).build_map(&discovered).await {
                Ok(map) => {
                    if let Some(err) = map.incomplete_error() {
                        self.push_warning(err.to_string()).await;
                    }
                    map
                }
                Err(e) => {
                    self.push_warning(format!(
                        "local gateway {} unavailable, using cloud only: {e}",
                        local.host()
                    ))
                    .await;
                    AddressMap::unmapped(self.inner.store.cloud_ids())
                }
            },
            None => AddressMap::unmapped(self.inner.store.cloud_ids()),
        };
        self.install_map(map);
        Ok(())
    }

    async fn spawn_tasks(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        let cancel = self.inner.cancel.clone();

        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            handles.push(tokio::spawn(command_processor_task(
                self.clone(),
                rx,
                cancel.clone(),
            )));
        }

        let cloud_period = self.inner.config.effective_cloud_interval();
        let local_period = self.inner.config.local_interval;

        if self.inner.local.is_some() && !local_period.is_zero() {
            handles.push(tokio::spawn(local_poll_task(
                self.clone(),
                local_period,
                cloud_period,
                cancel.clone(),
            )));
        }

        if !cloud_period.is_zero() {
            handles.push(tokio::spawn(cloud_poll_task(self.clone(), cloud_period, cancel)));
        }
    }

    /// `true` when the fast loop should only probe at the cloud cadence.
    fn local_degraded(&self) -> bool {
        self.tracking().in_fallback || self.inner.store.address_map().mapped_count() == 0
    }

    fn record_local_failure(&self, err: &CoreError) {
        let (failures, entered_fallback) = {
            let mut t = self.tracking();
            t.local_failures = t.local_failures.saturating_add(1);
            let enter = t.local_failures >= LOCAL_FAILURE_THRESHOLD && !t.in_fallback;
            if enter {
                t.in_fallback = true;
            }
            (t.local_failures, enter)
        };

        if failures < LOCAL_FAILURE_THRESHOLD {
            debug!(error = %err, failures, "local poll failed");
            return;
        }
        if !entered_fallback {
            debug!(error = %err, failures, "local poll still failing");
            return;
        }

        warn!(error = %err, failures, "local gateway keeps failing, falling back to cloud");
        let map = self.inner.store.address_map();
        for (cloud_id, _) in map.iter() {
            self.update_state(cloud_id, |s| s.sync = SyncState::CloudFallback);
        }
        self.emit(EngineEvent::CloudFallback {
            consecutive_failures: failures,
        });
    }

    fn record_local_success(&self) {
        let recovered = {
            let mut t = self.tracking();
            t.local_failures = 0;
            std::mem::replace(&mut t.in_fallback, false)
        };
        if recovered {
            info!("local gateway recovered");
            self.emit(EngineEvent::LocalRecovered);
        }
    }

    /// Merge gateway telemetry into mapped devices.
    ///
    /// Devices that accepted a command after `started` are skipped: the
    /// reading predates the write.
    fn merge_local(&self, units: &BTreeMap<u8, UnitStatus>, started: u64) {
        let now = Utc::now();
        let map = self.inner.store.address_map();

        for (cloud_id, slot) in map.iter() {
            let Some(unit) = units.get(&slot) else {
                continue;
            };
            let reading = LocalReading::from(unit);

            // Held across the store write so an accepted command cannot
            // land between the staleness check and the merge.
            let merged = {
                let t = self.tracking();
                if t.last_command_gen.get(cloud_id).is_some_and(|g| *g > started) {
                    debug!(cloud_id, slot, "discarding local reading older than a command");
                    continue;
                }
                let pending = t.pending.get(cloud_id).cloned().unwrap_or_default();
                self.inner
                    .store
                    .update_state(cloud_id, |s| apply_local(s, &reading, &pending, now))
            };
            if let Some(state) = merged {
                self.emit_state(state);
            }
        }

        self.inner.store.mark_local_poll(now);
    }

    /// Merge a cloud listing. Returns the devices whose local telemetry
    /// disagreed often enough to warrant a remap.
    #[allow(clippy::too_many_lines)]
    fn merge_cloud(&self, listing: &[CloudDevice]) -> Vec<String> {
        let now = Utc::now();
        let listed: BTreeSet<&str> = listing.iter().map(|d| d.id.as_str()).collect();

        for cloud_id in self.inner.store.cloud_ids() {
            if listed.contains(cloud_id.as_str()) {
                continue;
            }
            info!(cloud_id, "device vanished from the cloud listing");
            self.inner.store.remove_device(&cloud_id);
            {
                let mut t = self.tracking();
                t.pending.remove(&cloud_id);
                t.last_command_gen.remove(&cloud_id);
                t.disagreements.remove(&cloud_id);
                t.cloud_prints.remove(&cloud_id);
                t.remap_settled.remove(&cloud_id);
            }
            self.emit(EngineEvent::DeviceRemoved { cloud_id });
        }

        let mut disagreeing = Vec::new();

        for d in listing {
            let reading = CloudReading::from(d);

            if !self.inner.store.contains(&d.id) {
                info!(cloud_id = %d.id, name = %d.name, "new device in the cloud listing");
                let mut state = state_from_cloud(d, now);
                state.sync = SyncState::CloudOnly;
                self.tracking()
                    .cloud_prints
                    .insert(d.id.clone(), Fingerprint::from_state(&state));
                self.inner.store.insert_device(device_from_cloud(d), state);
                self.inner
                    .store
                    .address_map
                    .rcu(|map| map.with_unmapped(&d.id));
                self.emit(EngineEvent::DeviceAdded {
                    cloud_id: d.id.clone(),
                });
                continue;
            }

            if self
                .inner
                .store
                .device(&d.id)
                .is_some_and(|dev| dev.name != d.name || dev.area != d.area)
            {
                self.inner.store.update_device(&d.id, |dev| {
                    dev.name.clone_from(&d.name);
                    dev.area.clone_from(&d.area);
                });
            }

            let mut t = self.tracking();
            let pending = t.pending.remove(&d.id);
            let mut disagrees = false;
            let mut print = None;

            let merged = self.inner.store.update_state(&d.id, |s| {
                let local_owns = s.sync == SyncState::Synced && pending.is_none();
                if local_owns {
                    disagrees = s.power != reading.power
                        || (s.power
                            && reading.hvac_mode != HvacMode::Unknown
                            && s.hvac_mode != reading.hvac_mode);
                }
                apply_cloud(s, &reading, local_owns, now);
                print = Some(Fingerprint {
                    power: reading.power,
                    hvac_mode: Some(reading.hvac_mode),
                    fan_mode: Some(reading.fan_mode),
                    swing_on: reading.swing_on,
                    target_temp: reading.target_temp,
                });
            });

            if let Some(print) = print {
                t.cloud_prints.insert(d.id.clone(), print);
            }
            if disagrees {
                let count = t.disagreements.entry(d.id.clone()).or_insert(0);
                *count += 1;
                debug!(cloud_id = %d.id, count = *count, "local telemetry disagrees with cloud");
                if *count >= DISAGREEMENT_THRESHOLD && !t.remap_settled.contains(&d.id) {
                    disagreeing.push(d.id.clone());
                }
            } else {
                t.disagreements.remove(&d.id);
                t.remap_settled.remove(&d.id);
            }
            drop(t);

            if let Some(state) = merged {
                self.emit_state(state);
            }
        }

        self.inner.store.mark_cloud_poll(now);
        disagreeing
    }

    fn mark_unavailable(&self, err: &CoreError) {
        warn!(error = %err, "cloud poll failed");
        let reason = err.to_string();
        for cloud_id in self.inner.store.cloud_ids() {
            let was_available = self
                .inner
                .store
                .state(&cloud_id)
                .is_some_and(|s| s.available);
            if !was_available {
                continue;
            }
            self.update_state(&cloud_id, |s| s.available = false);
            self.emit(EngineEvent::DeviceUnavailable {
                cloud_id,
                reason: reason.clone(),
            });
        }
    }

    /// Credentials rejected at runtime: stop both loops.
    fn fail_auth(&self, err: &CoreError) {
        warn!(error = %err, "cloud rejected credentials, stopping sync");
        self.inner.status.send_replace(EngineStatus::Failed);
        self.emit(EngineEvent::AuthFailed {
            message: err.to_string(),
        });
        self.inner.cancel.cancel();
    }

    fn remap_from(&self, units: &BTreeMap<u8, UnitStatus>) -> Arc<AddressMap> {
        self.install_map(associate(&self.remap_prints(), units))
    }

    /// Remap after persistent disagreement. A rebuild that reproduces the
    /// current pairing is not installed, and the devices are parked in
    /// `remap_settled` until they agree with the cloud again.
    async fn remap_disagreeing(&self, cloud_ids: &[String]) -> Result<(), CoreError> {
        let units = self.local_client()?.poll_units().await?;
        let rebuilt = associate(&self.remap_prints(), &units);

        if rebuilt.same_pairing(&self.inner.store.address_map()) {
            debug!(devices = ?cloud_ids, "remap would keep the same pairing, leaving the map as is");
            let mut t = self.tracking();
            for cloud_id in cloud_ids {
                t.disagreements.remove(cloud_id);
                t.remap_settled.insert(cloud_id.clone());
            }
            return Ok(());
        }

        info!(devices = ?cloud_ids, "local telemetry keeps disagreeing with the cloud, remapping");
        self.install_map(rebuilt);
        Ok(())
    }

    /// Cloud fingerprints for every known device, latest listing first.
    fn remap_prints(&self) -> Vec<(String, Fingerprint)> {
        let t = self.tracking();
        self.inner
            .store
            .states_snapshot()
            .iter()
            .map(|s| {
                let print = t
                    .cloud_prints
                    .get(&s.cloud_id)
                    .copied()
                    .unwrap_or_else(|| Fingerprint::from_state(s));
                (s.cloud_id.clone(), print)
            })
            .collect()
    }

    /// Store a new map and move devices between mapped and cloud-only.
    fn install_map(&self, map: AddressMap) -> Arc<AddressMap> {
        let in_fallback = {
            let mut t = self.tracking();
            t.disagreements.clear();
            t.remap_settled.clear();
            t.in_fallback
        };

        let mapped = map.mapped_count();
        let unmapped = map.unmapped_ids().to_vec();
        let slots: HashMap<String, u8> = map.iter().map(|(id, slot)| (id.to_owned(), slot)).collect();
        self.inner.store.set_address_map(map);

        for cloud_id in self.inner.store.cloud_ids() {
            let is_mapped = slots.contains_key(&cloud_id);
            self.update_state(&cloud_id, |s| {
                s.sync = match (is_mapped, s.sync.is_mapped()) {
                    (true, true) => s.sync,
                    (true, false) if in_fallback => SyncState::CloudFallback,
                    (true, false) => SyncState::Mapped,
                    (false, _) => SyncState::CloudOnly,
                };
            });
        }

        self.emit(EngineEvent::Remapped { mapped, unmapped });
        self.inner.store.address_map()
    }

    /// Run one command against the cloud. Caller is the command processor.
    async fn execute(&self, cloud_id: &str, command: &ControlCommand) -> CommandOutcome {
        let _gate = self.inner.cloud_gate.lock().await;
        let request = control_request(cloud_id, command);
        debug!(cloud_id, ?request, "sending control command");

        let result = self
            .inner
            .session
            .call(|client, session| {
                let request = request.clone();
                async move { client.control(&session, &request).await }
            })
            .await;

        match result {
            Ok(()) => {
                self.apply_accepted(cloud_id, command);
                info!(cloud_id, "control command accepted");
                CommandOutcome::Accepted
            }
            Err(e) => {
                if e.is_credential_rejection() {
                    self.fail_auth(&e);
                }
                warn!(cloud_id, error = %e, "control command rejected");
                let reason = match e {
                    CoreError::CommandRejected { reason, .. } => reason,
                    other => other.to_string(),
                };
                CommandOutcome::Rejected { reason }
            }
        }
    }

    /// Record an accepted command and apply it optimistically. Bookkeeping
    /// and the store write share one `tracking` critical section with
    /// `merge_local`.
    fn apply_accepted(&self, cloud_id: &str, command: &ControlCommand) {
        let now = Utc::now();
        let applied = {
            let mut t = self.tracking();
            let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
            t.pending
                .entry(cloud_id.to_owned())
                .and_modify(|p| *p = p.merged_with(command))
                .or_insert_with(|| command.clone());
            t.last_command_gen.insert(cloud_id.to_owned(), generation);
            t.disagreements.remove(cloud_id);

            self.inner.store.update_state(cloud_id, |s| {
                command.apply_to(s);
                s.freshness = Freshness {
                    source: Source::Cloud,
                    at: now,
                };
            })
        };
        if let Some(state) = applied {
            self.emit_state(state);
        }
    }
}

// ── Merge rules ──────────────────────────────────────────────────

/// Local telemetry owns power, mode and current temperature, except for
/// fields a pending command wrote.
fn apply_local(
    state: &mut DeviceState,
    reading: &LocalReading,
    pending: &ControlCommand,
    now: DateTime<Utc>,
) {
    if pending.power.is_none() {
        state.power = reading.power;
    }
    if pending.hvac_mode.is_none() {
        if let Some(mode) = reading.hvac_mode {
            state.hvac_mode = mode;
        }
    }
    state.current_temp = Some(reading.current_temp);
    state.error_code = Some(reading.error_code);
    state.last_local = Some(now);
    state.freshness = Freshness {
        source: Source::Local,
        at: now,
    };
    state.sync = SyncState::Synced;
}

/// The cloud always owns fan, swing and target temperature; it also owns
/// power, mode and current temperature unless local telemetry does.
fn apply_cloud(state: &mut DeviceState, reading: &CloudReading, local_owns: bool, now: DateTime<Utc>) {
    if !local_owns {
        state.power = reading.power;
        if reading.hvac_mode != HvacMode::Unknown {
            state.hvac_mode = reading.hvac_mode;
        }
        if reading.current_temp.is_some() {
            state.current_temp = reading.current_temp;
        }
        state.freshness = Freshness {
            source: Source::Cloud,
            at: now,
        };
    }
    state.fan_mode = reading.fan_mode;
    state.swing_on = reading.swing_on;
    if reading.target_temp.is_some() {
        state.target_temp = reading.target_temp;
    }
    state.available = true;
    state.last_cloud = Some(now);
}

// ── Background tasks ─────────────────────────────────────────────

fn build_transport(config: &EngineConfig) -> TransportConfig {
    TransportConfig {
        tls: config
            .ca_cert
            .clone()
            .map_or(TlsMode::System, TlsMode::CustomCa),
        timeout: config.cloud_timeout,
    }
}

/// Fast loop. While degraded (fallback, or nothing mapped) the gateway is
/// only probed every `probe_period`.
async fn local_poll_task(
    engine: SyncEngine,
    period: Duration,
    probe_period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick
    let mut last_probe: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let due = if engine.local_degraded() {
                    let now = Instant::now();
                    let due = last_probe.is_none_or(|t| now.duration_since(t) >= probe_period);
                    if due {
                        last_probe = Some(now);
                    }
                    due
                } else {
                    last_probe = None;
                    true
                };

                if due {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        result = engine.poll_local() => {
                            if let Err(e) = result {
                                debug!(error = %e, "local tick failed");
                            }
                        }
                    }
                }
            }
        }
    }
    debug!("local poll task exited");
}

async fn cloud_poll_task(engine: SyncEngine, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = engine.poll_cloud() => {
                        if let Err(e) = result {
                            debug!(error = %e, "cloud tick failed");
                        }
                    }
                }
            }
        }
    }
    debug!("cloud poll task exited");
}

/// Process commands one at a time. Dropping an envelope on cancel makes
/// the caller see `EngineStopped`.
async fn command_processor_task(
    engine: SyncEngine,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    outcome = engine.execute(&envelope.cloud_id, &envelope.command) => {
                        let _ = envelope.response_tx.send(outcome);
                    }
                }
            }
        }
    }
    debug!("command processor exited");
}
