use std::sync::Arc;

use lvap_common::EtherAddress;
use lvap_wire::MulticastMode;
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::{
    frame::{GroupMembership, Outbound, Stage, TxFrame},
    registry::{Registry, Station},
    AgentStats,
};

/// Verdict of the data path admission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Admission {
    /// The frame may be sent.
    Admitted,
    /// No station with the destination address.
    UnknownStation,
    /// The station is attached to another radio.
    WrongRadio,
    /// Filtering is disabled for the station.
    FilteringDisabled,
    /// The station is not authenticated.
    NotAuthenticated,
    /// The station is not associated.
    NotAssociated,
    /// The station is only served upstream by this access point.
    UplinkOnly,
}

impl Admission {
    /// Gate for a unicast frame towards `station` on `iface`.
    pub fn check(station: Option<&Station>, iface: usize) -> Self {
        let Some(station) = station else { return Self::UnknownStation };
        if station.iface != iface {
            Self::WrongRadio
        } else if !station.flags.set_mask() {
            Self::FilteringDisabled
        } else if !station.flags.authenticated() {
            Self::NotAuthenticated
        } else if !station.flags.associated() {
            Self::NotAssociated
        } else if station.flags.uplink_only() {
            Self::UplinkOnly
        } else {
            Self::Admitted
        }
    }
}

/// A frame ready to be queued under its tenant and DSCP class.
#[derive(Debug, Clone)]
pub struct Classified {
    /// Tenant the frame belongs to.
    pub ssid: String,
    /// DSCP class of the frame.
    pub dscp: u8,
    /// The frame and its on-air addressing.
    pub out: Outbound,
}

/// Maps outbound frames to traffic classes and on-air addressing.
///
/// Unicast frames go through the admission gate. Group frames are fanned out
/// according to the multicast mode of the policy for the group.
pub struct Classifier {
    registry: Arc<Registry>,
    groups: Arc<dyn GroupMembership>,
    stats: Arc<AgentStats>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier").finish_non_exhaustive()
    }
}

impl Classifier {
    /// Creates a classifier over the registry and group membership.
    pub fn new(
        registry: Arc<Registry>,
        groups: Arc<dyn GroupMembership>,
        stats: Arc<AgentStats>,
    ) -> Self {
        Self { registry, groups, stats }
    }

    fn unicast(&self, frame: TxFrame) -> Vec<Classified> {
        let stations = self.registry.read_stations();
        let station = stations.get(&frame.dst);
        let verdict = Admission::check(station, frame.iface);

        match (verdict, station) {
            (Admission::Admitted, Some(station)) => {
                let classified = Classified {
                    ssid: station.ssid.clone(),
                    dscp: frame.dscp,
                    out: Outbound { ra: frame.dst, ta: station.vbssid, frame },
                };
                vec![classified]
            }
            _ => {
                self.stats.increment_refused(verdict);
                if self.stats.verbose() {
                    trace!(dst = %frame.dst, iface = frame.iface, ?verdict, "frame refused");
                }
                Vec::new()
            }
        }
    }

    fn multicast(&self, frame: TxFrame) -> Vec<Classified> {
        let mode = if frame.dst.is_broadcast() {
            MulticastMode::Legacy
        } else {
            self.registry
                .with_policy(frame.dst, frame.iface, |p| p.mcast)
                .unwrap_or_default()
        };

        let stations = self.registry.read_stations();
        let on_radio = |s: &&Station| s.iface == frame.iface;
        let mut out = Vec::new();

        match mode {
            MulticastMode::Legacy => {
                // one copy per BSSID, whoever serves it
                let mut seen = FxHashSet::default();
                let station_bssids = stations
                    .values()
                    .filter(on_radio)
                    .filter(|s| s.is_attached() && !s.flags.uplink_only())
                    .map(|s| (s.vbssid, s.ssid.clone()));
                let vaps = self.registry.read_vaps();
                let vap_bssids = vaps
                    .values()
                    .filter(|v| v.iface == frame.iface)
                    .map(|v| (v.home_bssid, v.ssid.clone()));

                for (bssid, ssid) in station_bssids.chain(vap_bssids) {
                    if seen.insert(bssid) {
                        out.push(classified(&frame, frame.dst, bssid, ssid));
                    }
                }
            }
            MulticastMode::Dms => {
                // unicast copies, one per home BSSID
                let mut seen = FxHashSet::default();
                for sta in self.sorted_subscribers(frame.dst) {
                    let Some(station) = stations.get(&sta) else { continue };
                    if !on_radio(&station) || !station.is_attached() {
                        continue;
                    }
                    if seen.insert(station.home_bssid) {
                        out.push(classified(&frame, station.addr, station.vbssid, station.ssid.clone()));
                    }
                }
            }
            MulticastMode::Ur => {
                for sta in self.sorted_subscribers(frame.dst) {
                    let Some(station) = stations.get(&sta) else { continue };
                    if on_radio(&station) {
                        out.push(classified(&frame, frame.dst, station.vbssid, station.ssid.clone()));
                    }
                }
            }
        }

        out
    }

    fn sorted_subscribers(&self, group: EtherAddress) -> Vec<EtherAddress> {
        let mut subscribers = self.groups.subscribers(group);
        subscribers.sort_unstable();
        subscribers
    }
}

fn classified(frame: &TxFrame, ra: EtherAddress, ta: EtherAddress, ssid: String) -> Classified {
    Classified { ssid, dscp: frame.dscp, out: Outbound { ra, ta, frame: frame.clone() } }
}

impl Stage<TxFrame> for Classifier {
    type Out = Classified;

    fn process(&self, frame: TxFrame) -> Vec<Classified> {
        if frame.dst.is_group() {
            self.multicast(frame)
        } else {
            self.unicast(frame)
        }
    }
}
