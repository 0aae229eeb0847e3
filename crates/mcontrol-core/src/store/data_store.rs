// ── Central reactive data store ──
//
// Devices, their merged states and the current address map. Mutations are
// broadcast to subscribers via `watch` channels.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::collection::KeyedCollection;
use crate::mapping::AddressMap;
use crate::model::{Device, DeviceState};
use crate::stream::StateStream;

/// Central reactive store for one engine.
///
/// Reads never block writers: collections use per-shard locks within
/// `DashMap` and the address map is swapped atomically.
pub struct DataStore {
    pub(crate) devices: KeyedCollection<Device>,
    pub(crate) states: KeyedCollection<DeviceState>,
    pub(crate) address_map: ArcSwap<AddressMap>,
    pub(crate) last_local_poll: watch::Sender<Option<DateTime<Utc>>>,
    pub(crate) last_cloud_poll: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    pub fn new() -> Self {
        let (last_local_poll, _) = watch::channel(None);
        let (last_cloud_poll, _) = watch::channel(None);

        Self {
            devices: KeyedCollection::new(),
            states: KeyedCollection::new(),
            address_map: ArcSwap::from_pointee(AddressMap::default()),
            last_local_poll,
            last_cloud_poll,
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    /// Devices in cloud discovery order.
    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    /// States in cloud discovery order.
    pub fn states_snapshot(&self) -> Arc<Vec<Arc<DeviceState>>> {
        self.states.snapshot()
    }

    pub fn address_map(&self) -> Arc<AddressMap> {
        self.address_map.load_full()
    }

    // ── Single-entity lookups ────────────────────────────────────────

    pub fn device(&self, cloud_id: &str) -> Option<Arc<Device>> {
        self.devices.get(cloud_id)
    }

    pub fn state(&self, cloud_id: &str) -> Option<Arc<DeviceState>> {
        self.states.get(cloud_id)
    }

    pub fn contains(&self, cloud_id: &str) -> bool {
        self.devices.contains(cloud_id)
    }

    /// Resolve a cloud id or a case-insensitive device name.
    pub fn find_device(&self, identifier: &str) -> Option<Arc<Device>> {
        self.devices.get(identifier).or_else(|| {
            self.devices
                .snapshot()
                .iter()
                .find(|d| d.name.eq_ignore_ascii_case(identifier))
                .cloned()
        })
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Cloud ids in discovery order.
    pub fn cloud_ids(&self) -> Vec<String> {
        self.devices.keys()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_states(&self) -> StateStream {
        StateStream::new(self.states.subscribe())
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_local_poll(&self) -> Option<DateTime<Utc>> {
        *self.last_local_poll.borrow()
    }

    pub fn last_cloud_poll(&self) -> Option<DateTime<Utc>> {
        *self.last_cloud_poll.borrow()
    }

    /// Monotonic counter bumped on every state mutation.
    pub fn state_version(&self) -> u64 {
        self.states.version()
    }

    // ── Mutations (engine only) ──────────────────────────────────────

    /// Insert a device with its initial state. Returns `true` if new.
    pub(crate) fn insert_device(&self, device: Device, state: DeviceState) -> bool {
        let id = device.cloud_id.clone();
        let is_new = self.devices.upsert(&id, device);
        self.states.upsert(&id, state);
        is_new
    }

    /// Remove a device and its state; also drops it from the address map.
    pub(crate) fn remove_device(&self, cloud_id: &str) -> Option<Arc<DeviceState>> {
        self.devices.remove(cloud_id);
        self.address_map.rcu(|map| map.without(cloud_id));
        self.states.remove(cloud_id)
    }

    /// Read-modify-write one device's state.
    pub(crate) fn update_state<F>(&self, cloud_id: &str, f: F) -> Option<Arc<DeviceState>>
    where
        F: FnOnce(&mut DeviceState),
    {
        self.states.update(cloud_id, f)
    }

    pub(crate) fn update_device<F>(&self, cloud_id: &str, f: F) -> Option<Arc<Device>>
    where
        F: FnOnce(&mut Device),
    {
        self.devices.update(cloud_id, f)
    }

    /// Install a new address map and record each device's slot.
    pub(crate) fn set_address_map(&self, map: AddressMap) {
        for id in self.devices.keys() {
            let slot = map.slot_for(&id);
            if self.devices.get(&id).is_some_and(|d| d.local_slot != slot) {
                self.devices.update(&id, |d| d.local_slot = slot);
            }
        }
        self.address_map.store(Arc::new(map));
    }

    pub(crate) fn mark_local_poll(&self, at: DateTime<Utc>) {
        self.last_local_poll.send_modify(|t| *t = Some(at));
    }

    pub(crate) fn mark_cloud_poll(&self, at: DateTime<Utc>) {
        self.last_cloud_poll.send_modify(|t| *t = Some(at));
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}
