// ── Cloud id → gateway slot mapping ──
//
// The cloud and the gateway share no identifier, so devices are paired
// with slots either by discovery order (when the counts agree) or by a
// unique match on the control fields both sides report. Anything
// ambiguous stays unmapped.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, info};

use mcontrol_api::LocalClient;
use mcontrol_api::local::UnitStatus;

use crate::convert::LocalReading;
use crate::error::CoreError;
use crate::model::{DeviceState, FanMode, HvacMode};

/// Resolved pairing of cloud devices to gateway slots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressMap {
    slots: IndexMap<String, u8>,
    unmapped: Vec<String>,
    observed: BTreeSet<u8>,
    built_at: Option<DateTime<Utc>>,
}

impl AddressMap {
    /// Map with no gateway: every device unmapped.
    pub fn unmapped<I, S>(cloud_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unmapped: cloud_ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn slot_for(&self, cloud_id: &str) -> Option<u8> {
        self.slots.get(cloud_id).copied()
    }

    pub fn cloud_id_for(&self, slot: u8) -> Option<&str> {
        self.slots
            .iter()
            .find(|(_, s)| **s == slot)
            .map(|(id, _)| id.as_str())
    }

    /// `(cloud_id, slot)` pairs in device discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.slots.iter().map(|(id, slot)| (id.as_str(), *slot))
    }

    /// Devices that could not be paired.
    pub fn unmapped_ids(&self) -> &[String] {
        &self.unmapped
    }

    /// Slot set the gateway reported when the map was built.
    pub fn observed_slots(&self) -> &BTreeSet<u8> {
        &self.observed
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    pub fn mapped_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_complete(&self) -> bool {
        self.unmapped.is_empty()
    }

    /// Same pairs, unmapped ids and slot set, ignoring when it was built.
    pub fn same_pairing(&self, other: &Self) -> bool {
        self.slots == other.slots
            && self.unmapped == other.unmapped
            && self.observed == other.observed
    }

    /// `MappingIncomplete` diagnostic for a partial map.
    pub fn incomplete_error(&self) -> Option<CoreError> {
        (!self.is_complete()).then(|| CoreError::MappingIncomplete {
            unmapped: self.unmapped.clone(),
        })
    }

    /// Forget a device (it vanished from the cloud listing).
    pub(crate) fn without(&self, cloud_id: &str) -> Self {
        let mut next = self.clone();
        next.slots.shift_remove(cloud_id);
        next.unmapped.retain(|id| id != cloud_id);
        next
    }

    /// Record a newly listed device as unmapped.
    pub(crate) fn with_unmapped(&self, cloud_id: &str) -> Self {
        let mut next = self.clone();
        if !next.slots.contains_key(cloud_id) && !next.unmapped.iter().any(|id| id == cloud_id) {
            next.unmapped.push(cloud_id.to_owned());
        }
        next
    }
}

/// Control fields both sides report, used to recognise a unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fingerprint {
    pub power: bool,
    pub hvac_mode: Option<HvacMode>,
    pub fan_mode: Option<FanMode>,
    pub swing_on: bool,
    pub target_temp: Option<f32>,
}

impl Fingerprint {
    pub fn from_state(state: &DeviceState) -> Self {
        Self {
            power: state.power,
            hvac_mode: Some(state.hvac_mode),
            fan_mode: Some(state.fan_mode),
            swing_on: state.swing_on,
            target_temp: state.target_temp,
        }
    }

    pub fn from_unit(unit: &UnitStatus) -> Self {
        let r = LocalReading::from(unit);
        Self {
            power: r.power,
            hvac_mode: r.hvac_mode,
            fan_mode: r.fan_mode,
            swing_on: r.swing_on,
            target_temp: Some(r.target_temp),
        }
    }

    /// Exact match. Mode and fan only count while the unit runs; an idle
    /// gateway slot reports neither.
    pub fn matches(&self, other: &Self) -> bool {
        let temps_equal = match (self.target_temp, other.target_temp) {
            (Some(a), Some(b)) => (a - b).abs() < 0.5,
            _ => false,
        };
        if self.power != other.power || self.swing_on != other.swing_on || !temps_equal {
            return false;
        }
        if !self.power {
            return true;
        }
        self.hvac_mode == other.hvac_mode && self.fan_mode == other.fan_mode
    }
}

/// Pair devices with slots.
///
/// `devices` is `(cloud_id, fingerprint)` in cloud listing order. With
/// equal counts devices pair with slots in ascending slot order.
/// Otherwise a device maps to a slot only when each matches exactly one
/// of the other side.
pub fn associate(devices: &[(String, Fingerprint)], units: &BTreeMap<u8, UnitStatus>) -> AddressMap {
    let observed: BTreeSet<u8> = units.keys().copied().collect();
    let mut slots = IndexMap::new();
    let mut unmapped = Vec::new();

    if !devices.is_empty() && devices.len() == units.len() {
        for ((cloud_id, _), slot) in devices.iter().zip(units.keys()) {
            slots.insert(cloud_id.clone(), *slot);
        }
    } else {
        let unit_prints: Vec<(u8, Fingerprint)> = units
            .iter()
            .map(|(slot, unit)| (*slot, Fingerprint::from_unit(unit)))
            .collect();

        for (cloud_id, print) in devices {
            let candidates: Vec<u8> = unit_prints
                .iter()
                .filter(|(_, up)| print.matches(up))
                .map(|(slot, _)| *slot)
                .collect();

            let unique = match candidates.as_slice() {
                [slot] => {
                    let (_, up) = unit_prints
                        .iter()
                        .find(|(s, _)| s == slot)
                        .copied()
                        .unwrap_or((*slot, *print));
                    let claimants = devices.iter().filter(|(_, p)| p.matches(&up)).count();
                    (claimants == 1).then_some(*slot)
                }
                _ => None,
            };

            match unique {
                Some(slot) => {
                    slots.insert(cloud_id.clone(), slot);
                }
                None => unmapped.push(cloud_id.clone()),
            }
        }
    }

    debug!(
        mapped = slots.len(),
        unmapped = unmapped.len(),
        slots = observed.len(),
        "address map built"
    );

    AddressMap {
        slots,
        unmapped,
        observed,
        built_at: Some(Utc::now()),
    }
}

/// Builds address maps by polling the gateway.
#[derive(Debug, Clone)]
pub struct AddressMapper {
    local: LocalClient,
}

impl AddressMapper {
    pub fn new(local: LocalClient) -> Self {
        Self { local }
    }

    /// Poll the gateway once and pair its slots with `devices`.
    ///
    /// `devices` are `(cloud_id, state)` in discovery order; the state
    /// carries the fingerprint from the cloud listing.
    pub async fn build_map(&self, devices: &[(String, DeviceState)]) -> Result<AddressMap, CoreError> {
        let units = self.local.poll_units().await?;
        let prints: Vec<(String, Fingerprint)> = devices
            .iter()
            .map(|(id, state)| (id.clone(), Fingerprint::from_state(state)))
            .collect();
        let map = associate(&prints, &units);
        info!(
            host = self.local.host(),
            mapped = map.mapped_count(),
            unmapped = map.unmapped_ids().len(),
            "mapped cloud devices to gateway slots"
        );
        Ok(map)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mcontrol_api::local::{LocalFan, LocalMode};

    use super::*;

    fn unit(slot: u8, power: bool, mode: LocalMode, target: u8) -> UnitStatus {
        UnitStatus {
            slot,
            power,
            mode,
            fan: if power { LocalFan::Auto } else { LocalFan::Off },
            swing: false,
            target_temp: target,
            current_temp: 22,
            error_code: 0,
        }
    }

    fn print(power: bool, mode: HvacMode, target: f32) -> Fingerprint {
        Fingerprint {
            power,
            hvac_mode: Some(mode),
            fan_mode: Some(FanMode::Auto),
            swing_on: false,
            target_temp: Some(target),
        }
    }

    fn units(list: Vec<UnitStatus>) -> BTreeMap<u8, UnitStatus> {
        list.into_iter().map(|u| (u.slot, u)).collect()
    }

    #[test]
    fn equal_counts_pair_by_order() {
        let devices = vec![
            ("a".to_owned(), print(true, HvacMode::Heat, 21.0)),
            ("b".to_owned(), print(true, HvacMode::Cool, 24.0)),
        ];
        // Fingerprints deliberately disagree: order wins with equal counts.
        let map = associate(
            &devices,
            &units(vec![
                unit(4, true, LocalMode::Cool, 24),
                unit(1, true, LocalMode::Heat, 21),
            ]),
        );
        assert_eq!(map.slot_for("a"), Some(1));
        assert_eq!(map.slot_for("b"), Some(4));
        assert!(map.is_complete());
        assert_eq!(map.cloud_id_for(4), Some("b"));
    }

    #[test]
    fn rebuilding_with_equal_counts_repeats_the_pairing() {
        let devices = vec![
            ("a".to_owned(), print(true, HvacMode::Heat, 21.0)),
            ("b".to_owned(), print(true, HvacMode::Cool, 24.0)),
        ];
        let gateway = units(vec![
            unit(0, true, LocalMode::Cool, 24),
            unit(1, false, LocalMode::Off, 21),
        ]);
        let first = associate(&devices, &gateway);
        let again = associate(&devices, &gateway);
        assert!(first.same_pairing(&again));

        let fewer = associate(&devices, &units(vec![unit(0, true, LocalMode::Cool, 24)]));
        assert!(!first.same_pairing(&fewer));
    }

    #[test]
    fn fewer_slots_map_by_unique_fingerprint() {
        let devices = vec![
            ("a".to_owned(), print(true, HvacMode::Cool, 24.0)),
            ("b".to_owned(), print(true, HvacMode::Heat, 21.0)),
            ("c".to_owned(), print(false, HvacMode::Cool, 26.0)),
        ];
        let map = associate(
            &devices,
            &units(vec![
                unit(0, true, LocalMode::Heat, 21),
                unit(1, false, LocalMode::Off, 26),
            ]),
        );
        assert_eq!(map.slot_for("a"), None);
        assert_eq!(map.slot_for("b"), Some(0));
        assert_eq!(map.slot_for("c"), Some(1));
        assert_eq!(map.unmapped_ids(), ["a".to_owned()]);
        assert!(matches!(
            map.incomplete_error(),
            Some(CoreError::MappingIncomplete { .. })
        ));
    }

    #[test]
    fn ambiguous_fingerprints_stay_unmapped() {
        let devices = vec![
            ("a".to_owned(), print(true, HvacMode::Cool, 24.0)),
            ("b".to_owned(), print(true, HvacMode::Cool, 24.0)),
            ("c".to_owned(), print(true, HvacMode::Heat, 20.0)),
        ];
        let map = associate(&devices, &units(vec![unit(2, true, LocalMode::Cool, 24)]));
        assert_eq!(map.mapped_count(), 0);
        assert_eq!(map.unmapped_ids().len(), 3);
    }

    #[test]
    fn two_identical_slots_do_not_map() {
        let devices = vec![("a".to_owned(), print(true, HvacMode::Cool, 24.0))];
        let map = associate(
            &devices,
            &units(vec![
                unit(0, true, LocalMode::Cool, 24),
                unit(1, true, LocalMode::Cool, 24),
            ]),
        );
        assert_eq!(map.slot_for("a"), None);
        assert_eq!(map.observed_slots().len(), 2);
    }

    #[test]
    fn off_units_match_without_mode() {
        let cloud = print(false, HvacMode::Heat, 22.0);
        let local = Fingerprint::from_unit(&unit(0, false, LocalMode::Off, 22));
        assert!(cloud.matches(&local));
    }

    #[test]
    fn map_edits() {
        let map = AddressMap::unmapped(["x", "y"]);
        let map = map.with_unmapped("z").with_unmapped("x").without("y");
        assert_eq!(map.unmapped_ids(), ["x".to_owned(), "z".to_owned()]);
    }
}
