//! Authoritative store of stations, virtual access points, radios and
//! transmission policies.

use std::sync::atomic::{AtomicUsize, Ordering};

use lvap_common::EtherAddress;
use lvap_wire::{ResourceElement, SetPort, SizeCount, StationInfo};
use parking_lot::{RwLock, RwLockReadGuard};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

mod policy;
pub use policy::{SizeCounters, TxPolicy};
use policy::PolicyTable;

mod resource;
pub use resource::ResourceMap;

mod station;
pub use station::{Station, Vap};

/// Failures of registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No station with this address.
    #[error("unknown station {0}")]
    UnknownStation(EtherAddress),
    /// No VAP with this BSSID.
    #[error("unknown virtual access point {0}")]
    UnknownVap(EtherAddress),
    /// The radio is not part of the inventory.
    #[error("unknown resource element {0:?}")]
    UnknownResource(ResourceElement),
    /// No radio with this interface number.
    #[error("unknown interface {0}")]
    UnknownInterface(usize),
    /// The radio inventory can only be installed once.
    #[error("resource elements already configured")]
    AlreadyConfigured,
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new entry was inserted.
    Created,
    /// An existing entry was overwritten.
    Updated,
    /// The entity existed and changed radio.
    Moved { from: usize },
}

/// Registry of everything the agent serves.
///
/// Every table sits behind its own reader/writer lock. Locks are always taken
/// in declaration order.
#[derive(Debug)]
pub struct Registry {
    resources: RwLock<ResourceMap>,
    stations: RwLock<FxHashMap<EtherAddress, Station>>,
    vaps: RwLock<FxHashMap<EtherAddress, Vap>>,
    policies: RwLock<PolicyTable>,
    /// Hardware address filter per interface.
    masks: RwLock<Vec<EtherAddress>>,
    mask_updates: AtomicUsize,
}

impl Registry {
    /// Creates an empty registry for the given radios.
    pub fn new(resources: Vec<ResourceElement>) -> Self {
        let policies = PolicyTable::new(&resources);
        let masks = vec![EtherAddress::BROADCAST; resources.len()];
        Self {
            resources: RwLock::new(ResourceMap::new(resources)),
            stations: RwLock::default(),
            vaps: RwLock::default(),
            policies: RwLock::new(policies),
            masks: RwLock::new(masks),
            mask_updates: AtomicUsize::new(0),
        }
    }

    /// Installs the radio inventory. Only allowed while none is configured.
    pub fn set_resources(&self, elements: Vec<ResourceElement>) -> Result<(), RegistryError> {
        let mut resources = self.resources.write();
        if !resources.is_empty() {
            return Err(RegistryError::AlreadyConfigured);
        }
        *self.policies.write() = PolicyTable::new(&elements);
        *self.masks.write() = vec![EtherAddress::BROADCAST; elements.len()];
        *resources = ResourceMap::new(elements);
        Ok(())
    }

    /// Snapshot of the radio inventory.
    pub fn resources(&self) -> ResourceMap {
        self.resources.read().clone()
    }

    /// Interface number of `rsrc`.
    #[inline]
    pub fn iface(&self, rsrc: &ResourceElement) -> Option<usize> {
        self.resources.read().iface(rsrc)
    }

    /// Radio behind interface `iface`.
    #[inline]
    pub fn element(&self, iface: usize) -> Option<ResourceElement> {
        self.resources.read().element(iface)
    }

    /// Adds a station or overwrites the existing record in place.
    ///
    /// The tenant mask is recomputed on creation, or when the update touches
    /// the filtering flag, a BSSID or the radio.
    pub fn upsert_station(&self, info: &StationInfo) -> Result<Upsert, RegistryError> {
        let iface = self.iface(&info.rsrc).ok_or(RegistryError::UnknownResource(info.rsrc))?;

        let (outcome, recompute) = {
            let mut stations = self.stations.write();
            match stations.get_mut(&info.sta) {
                Some(station) => {
                    let from = station.iface;
                    let recompute = station.update(info, iface);
                    let outcome =
                        if from == iface { Upsert::Updated } else { Upsert::Moved { from } };
                    (outcome, recompute)
                }
                None => {
                    stations.insert(info.sta, Station::new(info, iface));
                    (Upsert::Created, true)
                }
            }
        };

        {
            let mut policies = self.policies.write();
            if let Upsert::Moved { from } = outcome {
                policies.remove(info.sta, from);
            }
            if outcome != Upsert::Updated {
                policies.entry(info.sta, iface);
            }
        }

        if recompute {
            self.recompute_tenant_masks();
        }

        debug!(sta = %info.sta, iface, ?outcome, "station upserted");
        Ok(outcome)
    }

    /// Removes a station and its transmission policy.
    pub fn remove_station(&self, addr: EtherAddress) -> Result<Station, RegistryError> {
        let station =
            self.stations.write().remove(&addr).ok_or(RegistryError::UnknownStation(addr))?;
        self.policies.write().remove(addr, station.iface);
        self.recompute_tenant_masks();

        debug!(sta = %addr, iface = station.iface, "station removed");
        Ok(station)
    }

    /// Looks a station up by address.
    pub fn station(&self, addr: EtherAddress) -> Option<Station> {
        self.stations.read().get(&addr).cloned()
    }

    /// Every station, ordered by address.
    pub fn stations(&self) -> Vec<Station> {
        let mut stations: Vec<_> = self.stations.read().values().cloned().collect();
        stations.sort_unstable_by_key(|s| s.addr);
        stations
    }

    /// Number of registered stations.
    pub fn station_count(&self) -> usize {
        self.stations.read().len()
    }

    /// Read access to the station table for the packet path.
    pub(crate) fn read_stations(&self) -> RwLockReadGuard<'_, FxHashMap<EtherAddress, Station>> {
        self.stations.read()
    }

    pub(crate) fn read_vaps(&self) -> RwLockReadGuard<'_, FxHashMap<EtherAddress, Vap>> {
        self.vaps.read()
    }

    /// Inserts or updates the VAP at `home_bssid`.
    pub fn upsert_vap(
        &self,
        rsrc: ResourceElement,
        home_bssid: EtherAddress,
        ssid: &str,
    ) -> Result<Upsert, RegistryError> {
        let iface = self.iface(&rsrc).ok_or(RegistryError::UnknownResource(rsrc))?;
        let vap = Vap { home_bssid, ssid: ssid.to_owned(), rsrc, iface };

        let outcome = match self.vaps.write().insert(home_bssid, vap) {
            None => Upsert::Created,
            Some(old) if old.iface != iface => Upsert::Moved { from: old.iface },
            Some(_) => Upsert::Updated,
        };

        if outcome != Upsert::Updated {
            self.recompute_tenant_masks();
        }

        debug!(bssid = %home_bssid, ssid, iface, ?outcome, "vap upserted");
        Ok(outcome)
    }

    /// Removes the VAP at `home_bssid`.
    pub fn remove_vap(&self, home_bssid: EtherAddress) -> Result<Vap, RegistryError> {
        let vap =
            self.vaps.write().remove(&home_bssid).ok_or(RegistryError::UnknownVap(home_bssid))?;
        self.recompute_tenant_masks();

        debug!(bssid = %home_bssid, "vap removed");
        Ok(vap)
    }

    /// Looks a VAP up by BSSID.
    pub fn vap(&self, home_bssid: EtherAddress) -> Option<Vap> {
        self.vaps.read().get(&home_bssid).cloned()
    }

    /// Every VAP, ordered by BSSID.
    pub fn vaps(&self) -> Vec<Vap> {
        let mut vaps: Vec<_> = self.vaps.read().values().cloned().collect();
        vaps.sort_unstable_by_key(|v| v.home_bssid);
        vaps
    }

    /// Applies a transmission policy. Returns the interface it landed on.
    pub fn set_policy(&self, port: &SetPort) -> Result<usize, RegistryError> {
        let iface = self.iface(&port.rsrc).ok_or(RegistryError::UnknownResource(port.rsrc))?;
        let mut policies = self.policies.write();
        let policy = policies.entry(port.sta, iface).ok_or(RegistryError::UnknownResource(port.rsrc))?;
        policy.apply(port);
        Ok(iface)
    }

    /// Policy for `addr` on `iface`, falling back to the radio default.
    pub fn policy(&self, addr: EtherAddress, iface: usize) -> Option<TxPolicy> {
        self.policies.read().lookup(addr, iface).cloned()
    }

    /// Runs `f` on the policy for `addr` without cloning it.
    pub(crate) fn with_policy<R>(
        &self,
        addr: EtherAddress,
        iface: usize,
        f: impl FnOnce(&TxPolicy) -> R,
    ) -> Option<R> {
        self.policies.read().lookup(addr, iface).map(f)
    }

    /// Every explicitly configured policy, ordered by interface and address.
    pub fn policies(&self) -> Vec<(EtherAddress, usize, TxPolicy)> {
        let mut policies: Vec<_> = self
            .policies
            .read()
            .iter()
            .map(|((addr, iface), policy)| (*addr, *iface, policy.clone()))
            .collect();
        policies.sort_unstable_by_key(|(addr, iface, _)| (*iface, *addr));
        policies
    }

    #[inline]
    pub(crate) fn record_tx(&self, addr: EtherAddress, iface: usize, len: usize) {
        if let Some(policy) = self.policies.read().get(addr, iface) {
            policy.tx.record(len);
        }
    }

    #[inline]
    pub(crate) fn record_rx(&self, addr: EtherAddress, iface: usize, len: usize) {
        if let Some(policy) = self.policies.read().get(addr, iface) {
            policy.rx.record(len);
        }
    }

    /// Transmit and receive histograms of a station.
    pub fn counters(&self, addr: EtherAddress) -> Result<(Vec<SizeCount>, Vec<SizeCount>), RegistryError> {
        let iface = self
            .stations
            .read()
            .get(&addr)
            .map(|s| s.iface)
            .ok_or(RegistryError::UnknownStation(addr))?;
        Ok(self
            .policies
            .read()
            .lookup(addr, iface)
            .map(|p| (p.tx.to_vec(), p.rx.to_vec()))
            .unwrap_or_default())
    }

    /// Hardware address filter of `iface`.
    pub fn tenant_mask(&self, iface: usize) -> Option<EtherAddress> {
        self.masks.read().get(iface).copied()
    }

    /// Hardware address filter of every interface.
    pub fn tenant_masks(&self) -> Vec<EtherAddress> {
        self.masks.read().clone()
    }

    /// Number of tenant mask recomputations so far.
    pub fn mask_updates(&self) -> usize {
        self.mask_updates.load(Ordering::Relaxed)
    }

    /// Recomputes the hardware filter of every radio.
    ///
    /// Starting from all ones, every BSSID served on the radio clears the bits
    /// in which it differs from the radio address: `mask &= !(bssid ^ hwaddr)`.
    /// Stations only take part with filtering enabled.
    pub fn recompute_tenant_masks(&self) {
        let resources = self.resources.read();
        let stations = self.stations.read();
        let vaps = self.vaps.read();

        let mut masks = vec![EtherAddress::BROADCAST; resources.len()];
        for (iface, mask) in masks.iter_mut().enumerate() {
            let Some(hwaddr) = resources.element(iface).map(|r| r.hwaddr) else { continue };

            let station_bssids = stations
                .values()
                .filter(|s| s.iface == iface && s.flags.set_mask())
                .flat_map(|s| [s.vbssid, s.home_bssid]);
            let vap_bssids = vaps.values().filter(|v| v.iface == iface).map(|v| v.home_bssid);

            for bssid in station_bssids.chain(vap_bssids) {
                *mask = *mask & !(bssid ^ hwaddr);
            }
        }

        *self.masks.write() = masks;
        self.mask_updates.fetch_add(1, Ordering::Relaxed);
    }
}
