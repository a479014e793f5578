use lvap_common::EtherAddress;
use lvap_wire::{ResourceElement, StationFlags, StationInfo};

/// A client attached through its own virtual access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    /// Station address.
    pub addr: EtherAddress,
    /// BSSID the station is served from.
    pub vbssid: EtherAddress,
    /// BSSID of the shared access point the station belongs to. Differs from
    /// `vbssid` when a tenant shares infrastructure.
    pub home_bssid: EtherAddress,
    /// Encapsulation peer.
    pub encap: EtherAddress,
    /// Primary tenant.
    pub ssid: String,
    /// Secondary tenants.
    pub ssids: Vec<String>,
    /// Association id.
    pub assoc_id: u16,
    /// Radio the station is attached to.
    pub rsrc: ResourceElement,
    /// Interface number of `rsrc`.
    pub iface: usize,
    /// Authentication, association and filtering state.
    pub flags: StationFlags,
}

impl Station {
    pub(crate) fn new(info: &StationInfo, iface: usize) -> Self {
        Self {
            addr: info.sta,
            vbssid: info.vbssid,
            home_bssid: info.home_bssid,
            encap: info.encap,
            ssid: info.ssid.clone(),
            ssids: info.ssids.clone(),
            assoc_id: info.assoc_id,
            rsrc: info.rsrc,
            iface,
            flags: info.flags,
        }
    }

    /// Overwrites the record with `info`. Returns whether the tenant mask of
    /// the radio has to be recomputed.
    pub(crate) fn update(&mut self, info: &StationInfo, iface: usize) -> bool {
        let mask_changed = self.flags.set_mask() != info.flags.set_mask()
            || self.vbssid != info.vbssid
            || self.home_bssid != info.home_bssid
            || self.iface != iface;

        self.vbssid = info.vbssid;
        self.home_bssid = info.home_bssid;
        self.encap = info.encap;
        self.ssid.clone_from(&info.ssid);
        self.ssids.clone_from(&info.ssids);
        self.assoc_id = info.assoc_id;
        self.rsrc = info.rsrc;
        self.iface = iface;
        self.flags = info.flags;

        mask_changed
    }

    /// The station as carried on the wire.
    pub fn info(&self) -> StationInfo {
        StationInfo {
            flags: self.flags,
            assoc_id: self.assoc_id,
            rsrc: self.rsrc,
            sta: self.addr,
            encap: self.encap,
            home_bssid: self.home_bssid,
            vbssid: self.vbssid,
            ssid: self.ssid.clone(),
            ssids: self.ssids.clone(),
        }
    }

    /// Whether the station may receive data frames.
    #[inline]
    pub const fn is_attached(&self) -> bool {
        self.flags.authenticated() && self.flags.associated()
    }
}

/// A shared access point identity serving many stations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vap {
    /// BSSID of the VAP.
    pub home_bssid: EtherAddress,
    /// Tenant served.
    pub ssid: String,
    /// Radio the VAP beacons on.
    pub rsrc: ResourceElement,
    /// Interface number of `rsrc`.
    pub iface: usize,
}
