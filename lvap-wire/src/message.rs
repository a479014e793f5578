use bytes::{Buf, BufMut, Bytes, BytesMut};
use lvap_common::EtherAddress;

use crate::{buf::*, header::MsgType, types::*, Error};

/// Encoding and decoding of a message body (everything after the header).
pub(crate) trait Body: Sized {
    fn decode(src: &mut Bytes) -> Result<Self, Error>;
    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error>;
}

/// Periodic liveness message from the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// Keep-alive period in milliseconds.
    pub period_ms: u32,
    /// Bytes received from stations.
    pub uplink_bytes: u64,
    /// Bytes sent to stations.
    pub downlink_bytes: u64,
}

impl Body for Hello {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            wtp: get_addr(src, "hello")?,
            period_ms: get_u32(src, "hello")?,
            uplink_bytes: get_u64(src, "hello")?,
            downlink_bytes: get_u64(src, "hello")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_addr(dst, &self.wtp);
        dst.put_u32(self.period_ms);
        dst.put_u64(self.uplink_bytes);
        dst.put_u64(self.downlink_bytes);
        Ok(())
    }
}

/// A station scanning for networks, relayed to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// Scanning station.
    pub sta: EtherAddress,
    /// Radio the request was heard on.
    pub rsrc: ResourceElement,
    /// Requested SSID. Empty for a wildcard scan.
    pub ssid: String,
}

impl Body for ScanRequest {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            wtp: get_addr(src, "scan request")?,
            sta: get_addr(src, "scan request")?,
            rsrc: ResourceElement::decode(src)?,
            ssid: get_str(src, "ssid")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_addr(dst, &self.wtp);
        put_addr(dst, &self.sta);
        self.rsrc.encode(dst);
        put_str(dst, "ssid", &self.ssid)
    }
}

/// An authentication request relayed to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// Requesting station.
    pub sta: EtherAddress,
    /// BSSID the request was addressed to.
    pub bssid: EtherAddress,
}

impl Body for AuthRequest {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            wtp: get_addr(src, "auth request")?,
            sta: get_addr(src, "auth request")?,
            bssid: get_addr(src, "auth request")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_addr(dst, &self.wtp);
        put_addr(dst, &self.sta);
        put_addr(dst, &self.bssid);
        Ok(())
    }
}

/// An association request relayed to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssocRequest {
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// Requesting station.
    pub sta: EtherAddress,
    /// BSSID the request was addressed to.
    pub bssid: EtherAddress,
    /// Requested network.
    pub ssid: String,
}

impl Body for AssocRequest {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            wtp: get_addr(src, "assoc request")?,
            sta: get_addr(src, "assoc request")?,
            bssid: get_addr(src, "assoc request")?,
            ssid: get_str(src, "ssid")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_addr(dst, &self.wtp);
        put_addr(dst, &self.sta);
        put_addr(dst, &self.bssid);
        put_str(dst, "ssid", &self.ssid)
    }
}

/// Controller verdict for a relayed scan, authentication or association request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgmtResponse {
    /// Station the response is for.
    pub sta: EtherAddress,
    /// BSSID to answer from.
    pub bssid: EtherAddress,
    /// 802.11 status code.
    pub status: u16,
}

impl Body for MgmtResponse {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            sta: get_addr(src, "response")?,
            bssid: get_addr(src, "response")?,
            status: get_u16(src, "response")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_addr(dst, &self.sta);
        put_addr(dst, &self.bssid);
        dst.put_u16(self.status);
        Ok(())
    }
}

/// Station fields shared by the add-station request and the station-status report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationInfo {
    /// Authentication, association and filtering state.
    pub flags: StationFlags,
    /// Association id.
    pub assoc_id: u16,
    /// Radio the station is attached to.
    pub rsrc: ResourceElement,
    /// Station address.
    pub sta: EtherAddress,
    /// Encapsulation peer.
    pub encap: EtherAddress,
    /// BSSID of the shared access point.
    pub home_bssid: EtherAddress,
    /// BSSID the station is served from.
    pub vbssid: EtherAddress,
    /// Primary tenant.
    pub ssid: String,
    /// Secondary tenants.
    pub ssids: Vec<String>,
}

impl StationInfo {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let flags = StationFlags::from_bits(get_u16(src, "station")?);
        let assoc_id = get_u16(src, "station")?;
        let rsrc = ResourceElement::decode(src)?;
        let sta = get_addr(src, "station")?;
        let encap = get_addr(src, "station")?;
        let home_bssid = get_addr(src, "station")?;
        let vbssid = get_addr(src, "station")?;
        let ssid = get_str(src, "ssid")?;

        let n_ssids = get_u8(src, "ssid list")?;
        let mut ssids = Vec::with_capacity(n_ssids as usize);
        for _ in 0..n_ssids {
            ssids.push(get_str(src, "ssid list")?);
        }

        Ok(Self { flags, assoc_id, rsrc, sta, encap, home_bssid, vbssid, ssid, ssids })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(self.flags.bits());
        dst.put_u16(self.assoc_id);
        self.rsrc.encode(dst);
        put_addr(dst, &self.sta);
        put_addr(dst, &self.encap);
        put_addr(dst, &self.home_bssid);
        put_addr(dst, &self.vbssid);
        put_str(dst, "ssid", &self.ssid)?;
        dst.put_u8(count("ssid list", self.ssids.len(), u8::MAX as usize)?);
        for ssid in &self.ssids {
            put_str(dst, "ssid list", ssid)?;
        }
        Ok(())
    }
}

/// Adds or updates a station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddStation {
    pub module_id: u32,
    /// The station.
    pub info: StationInfo,
}

impl Body for AddStation {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self { module_id: get_u32(src, "add station")?, info: StationInfo::decode(src)? })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.module_id);
        self.info.encode(dst)
    }
}

/// State of one station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationStatus {
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// The station.
    pub info: StationInfo,
}

impl Body for StationStatus {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self { wtp: get_addr(src, "station status")?, info: StationInfo::decode(src)? })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_addr(dst, &self.wtp);
        self.info.encode(dst)
    }
}

/// Removes a station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelStation {
    pub module_id: u32,
    /// Station to remove.
    pub sta: EtherAddress,
}

impl Body for DelStation {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self { module_id: get_u32(src, "del station")?, sta: get_addr(src, "del station")? })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.module_id);
        put_addr(dst, &self.sta);
        Ok(())
    }
}

/// Outcome of an add/delete station request, correlated by `module_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationResponse {
    pub module_id: u32,
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// Station the request was about.
    pub sta: EtherAddress,
    /// [`Self::SUCCESS`] or [`Self::UNKNOWN`].
    pub status: u32,
}

impl StationResponse {
    /// The request was applied.
    pub const SUCCESS: u32 = 0;
    /// The station is not registered.
    pub const UNKNOWN: u32 = 1;
}

impl Body for StationResponse {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            module_id: get_u32(src, "station response")?,
            wtp: get_addr(src, "station response")?,
            sta: get_addr(src, "station response")?,
            status: get_u32(src, "station response")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.module_id);
        put_addr(dst, &self.wtp);
        put_addr(dst, &self.sta);
        dst.put_u32(self.status);
        Ok(())
    }
}

/// Transmission policy for one address on one radio.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetPort {
    /// Send without waiting for an acknowledgement.
    pub no_ack: bool,
    /// Address the policy applies to.
    pub sta: EtherAddress,
    /// Radio the policy applies on.
    pub rsrc: ResourceElement,
    /// RTS/CTS threshold in bytes.
    pub rts_cts: u16,
    /// How group frames are delivered.
    pub mcast: MulticastMode,
    /// Repetition count for unreliable multicast.
    pub ur_count: u8,
    /// Legacy rates in 500 kbps units.
    pub mcs: Vec<u8>,
    /// HT MCS indexes.
    pub ht_mcs: Vec<u8>,
}

impl SetPort {
    const FLAG_NO_ACK: u16 = 0x0001;
}

impl Body for SetPort {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let flags = get_u16(src, "set port")?;
        let sta = get_addr(src, "set port")?;
        let rsrc = ResourceElement::decode(src)?;
        let rts_cts = get_u16(src, "set port")?;
        let mcast = get_u8(src, "set port")?;
        let mcast = MulticastMode::try_from(mcast)
            .map_err(|v| Error::InvalidValue { field: "multicast mode", value: v as u32 })?;
        let ur_count = get_u8(src, "set port")?;

        let n_mcs = get_u8(src, "mcs")? as usize;
        need(src, "mcs", n_mcs)?;
        let mcs = src.split_to(n_mcs).to_vec();

        let n_ht = get_u8(src, "ht mcs")? as usize;
        need(src, "ht mcs", n_ht)?;
        let ht_mcs = src.split_to(n_ht).to_vec();

        Ok(Self { no_ack: flags & Self::FLAG_NO_ACK != 0, sta, rsrc, rts_cts, mcast, ur_count, mcs, ht_mcs })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(if self.no_ack { Self::FLAG_NO_ACK } else { 0 });
        put_addr(dst, &self.sta);
        self.rsrc.encode(dst);
        dst.put_u16(self.rts_cts);
        dst.put_u8(self.mcast as u8);
        dst.put_u8(self.ur_count);
        dst.put_u8(count("mcs", self.mcs.len(), u8::MAX as usize)?);
        dst.put_slice(&self.mcs);
        dst.put_u8(count("ht mcs", self.ht_mcs.len(), u8::MAX as usize)?);
        dst.put_slice(&self.ht_mcs);
        Ok(())
    }
}

/// Transmission policy in effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// The policy.
    pub port: SetPort,
}

impl Body for PortStatus {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self { wtp: get_addr(src, "port status")?, port: SetPort::decode(src)? })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_addr(dst, &self.wtp);
        self.port.encode(dst)
    }
}

/// Capability advertisement: radios and named network ports of this agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caps {
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// Radios, indexed by interface.
    pub resources: Vec<ResourceElement>,
    /// Named network ports.
    pub ports: Vec<NetworkPort>,
}

impl Body for Caps {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let wtp = get_addr(src, "caps")?;

        let n_rsrc = get_u8(src, "caps")?;
        let mut resources = Vec::with_capacity(n_rsrc as usize);
        for _ in 0..n_rsrc {
            resources.push(ResourceElement::decode(src)?);
        }

        let n_ports = get_u8(src, "caps")?;
        let mut ports = Vec::with_capacity(n_ports as usize);
        for _ in 0..n_ports {
            ports.push(NetworkPort::decode(src)?);
        }

        Ok(Self { wtp, resources, ports })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_addr(dst, &self.wtp);
        dst.put_u8(count("resources", self.resources.len(), u8::MAX as usize)?);
        for rsrc in &self.resources {
            rsrc.encode(dst);
        }
        dst.put_u8(count("ports", self.ports.len(), u8::MAX as usize)?);
        for port in &self.ports {
            port.encode(dst)?;
        }
        Ok(())
    }
}

/// Adds or updates a shared access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddVap {
    pub module_id: u32,
    /// Radio to serve on.
    pub rsrc: ResourceElement,
    /// BSSID of the access point.
    pub home_bssid: EtherAddress,
    /// Tenant served.
    pub ssid: String,
}

impl Body for AddVap {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            module_id: get_u32(src, "add vap")?,
            rsrc: ResourceElement::decode(src)?,
            home_bssid: get_addr(src, "add vap")?,
            ssid: get_str(src, "ssid")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.module_id);
        self.rsrc.encode(dst);
        put_addr(dst, &self.home_bssid);
        put_str(dst, "ssid", &self.ssid)
    }
}

/// Removes a shared access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelVap {
    pub module_id: u32,
    /// BSSID of the access point.
    pub home_bssid: EtherAddress,
}

impl Body for DelVap {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self { module_id: get_u32(src, "del vap")?, home_bssid: get_addr(src, "del vap")? })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.module_id);
        put_addr(dst, &self.home_bssid);
        Ok(())
    }
}

/// State of one shared access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VapStatus {
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// Radio it serves on.
    pub rsrc: ResourceElement,
    /// BSSID of the access point.
    pub home_bssid: EtherAddress,
    /// Tenant served.
    pub ssid: String,
}

impl Body for VapStatus {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            wtp: get_addr(src, "vap status")?,
            rsrc: ResourceElement::decode(src)?,
            home_bssid: get_addr(src, "vap status")?,
            ssid: get_str(src, "ssid")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_addr(dst, &self.wtp);
        self.rsrc.encode(dst);
        put_addr(dst, &self.home_bssid);
        put_str(dst, "ssid", &self.ssid)
    }
}

/// Request referring to a single station, correlated by `module_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountersRequest {
    pub module_id: u32,
    /// Station whose counters are requested.
    pub sta: EtherAddress,
}

impl Body for CountersRequest {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self { module_id: get_u32(src, "counters request")?, sta: get_addr(src, "counters request")? })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.module_id);
        put_addr(dst, &self.sta);
        Ok(())
    }
}

/// Per-size frame counters of one station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountersResponse {
    pub module_id: u32,
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// Station the counters belong to.
    pub sta: EtherAddress,
    /// Transmitted frames by size.
    pub tx: Vec<SizeCount>,
    /// Received frames by size.
    pub rx: Vec<SizeCount>,
}

impl Body for CountersResponse {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let module_id = get_u32(src, "counters response")?;
        let wtp = get_addr(src, "counters response")?;
        let sta = get_addr(src, "counters response")?;
        let n_tx = get_u16(src, "counters response")? as usize;
        let n_rx = get_u16(src, "counters response")? as usize;

        need(src, "counters", (n_tx + n_rx) * 6)?;
        let mut read = |n: usize| -> Vec<SizeCount> {
            (0..n).map(|_| SizeCount { size: src.get_u16(), count: src.get_u32() }).collect()
        };
        let tx = read(n_tx);
        let rx = read(n_rx);

        Ok(Self { module_id, wtp, sta, tx, rx })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.module_id);
        put_addr(dst, &self.wtp);
        put_addr(dst, &self.sta);
        dst.put_u16(count("tx counters", self.tx.len(), u16::MAX as usize)?);
        dst.put_u16(count("rx counters", self.rx.len(), u16::MAX as usize)?);
        for entry in self.tx.iter().chain(self.rx.iter()) {
            dst.put_u16(entry.size);
            dst.put_u32(entry.count);
        }
        Ok(())
    }
}

/// Requests the channel-quality map of a radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CqmRequest {
    pub module_id: u32,
    /// Radio to report on.
    pub rsrc: ResourceElement,
}

impl Body for CqmRequest {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self { module_id: get_u32(src, "cqm request")?, rsrc: ResourceElement::decode(src)? })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.module_id);
        self.rsrc.encode(dst);
        Ok(())
    }
}

/// Channel-quality map of a radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CqmResponse {
    pub module_id: u32,
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// Radio reported on.
    pub rsrc: ResourceElement,
    /// One entry per neighbor heard.
    pub entries: Vec<CqmEntry>,
}

impl Body for CqmResponse {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let module_id = get_u32(src, "cqm response")?;
        let wtp = get_addr(src, "cqm response")?;
        let rsrc = ResourceElement::decode(src)?;
        let n = get_u16(src, "cqm response")?;
        let mut entries = Vec::with_capacity(n as usize);
        for _ in 0..n {
            entries.push(CqmEntry::decode(src)?);
        }
        Ok(Self { module_id, wtp, rsrc, entries })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.module_id);
        put_addr(dst, &self.wtp);
        self.rsrc.encode(dst);
        dst.put_u16(count("cqm entries", self.entries.len(), u16::MAX as usize)?);
        for entry in &self.entries {
            entry.encode(dst);
        }
        Ok(())
    }
}

/// A (tenant, dscp) traffic rule and its scheduling quantum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficRule {
    /// Airtime credited per round, in microseconds.
    pub quantum: u32,
    /// Whether frames may be aggregated.
    pub amsdu: bool,
    /// DSCP class.
    pub dscp: u8,
    /// Tenant.
    pub ssid: String,
}

impl TrafficRule {
    const FLAG_AMSDU: u8 = 0x01;

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            quantum: get_u32(src, "traffic rule")?,
            amsdu: get_u8(src, "traffic rule")? & Self::FLAG_AMSDU != 0,
            dscp: get_u8(src, "traffic rule")?,
            ssid: get_str(src, "ssid")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.quantum);
        dst.put_u8(if self.amsdu { Self::FLAG_AMSDU } else { 0 });
        dst.put_u8(self.dscp);
        put_str(dst, "ssid", &self.ssid)
    }
}

/// Adds or updates a traffic rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTrafficRule {
    pub module_id: u32,
    /// The rule.
    pub rule: TrafficRule,
}

impl Body for AddTrafficRule {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self { module_id: get_u32(src, "add traffic rule")?, rule: TrafficRule::decode(src)? })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.module_id);
        self.rule.encode(dst)
    }
}

/// Removes a traffic rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelTrafficRule {
    pub module_id: u32,
    /// DSCP class of the rule.
    pub dscp: u8,
    /// Tenant of the rule.
    pub ssid: String,
}

impl Body for DelTrafficRule {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            module_id: get_u32(src, "del traffic rule")?,
            dscp: get_u8(src, "del traffic rule")?,
            ssid: get_str(src, "ssid")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.module_id);
        dst.put_u8(self.dscp);
        put_str(dst, "ssid", &self.ssid)
    }
}

/// State of one traffic rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficRuleStatus {
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// The rule.
    pub rule: TrafficRule,
}

impl Body for TrafficRuleStatus {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self { wtp: get_addr(src, "traffic rule status")?, rule: TrafficRule::decode(src)? })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_addr(dst, &self.wtp);
        self.rule.encode(dst)
    }
}

fn get_relation(src: &mut Bytes) -> Result<Relation, Error> {
    let raw = get_u8(src, "relation")?;
    Relation::try_from(raw).map_err(|v| Error::InvalidValue { field: "relation", value: v as u32 })
}

/// Registers an RSSI threshold trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRssiTrigger {
    /// Trigger identifier.
    pub id: u32,
    /// Station whose RSSI is watched.
    pub sta: EtherAddress,
    /// Comparison against `value`.
    pub relation: Relation,
    /// Threshold in dBm.
    pub value: i8,
    /// Evaluation period in milliseconds.
    pub period_ms: u16,
}

impl Body for AddRssiTrigger {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            id: get_u32(src, "rssi trigger")?,
            sta: get_addr(src, "rssi trigger")?,
            relation: get_relation(src)?,
            value: get_i8(src, "rssi trigger")?,
            period_ms: get_u16(src, "rssi trigger")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.id);
        put_addr(dst, &self.sta);
        dst.put_u8(self.relation as u8);
        dst.put_i8(self.value);
        dst.put_u16(self.period_ms);
        Ok(())
    }
}

/// An RSSI trigger started to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RssiTriggerFired {
    /// Trigger identifier.
    pub id: u32,
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// Radio the station is heard on.
    pub rsrc: ResourceElement,
    /// Current smoothed RSSI.
    pub current: i8,
}

impl Body for RssiTriggerFired {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            id: get_u32(src, "rssi report")?,
            wtp: get_addr(src, "rssi report")?,
            rsrc: ResourceElement::decode(src)?,
            current: get_i8(src, "rssi report")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.id);
        put_addr(dst, &self.wtp);
        self.rsrc.encode(dst);
        dst.put_i8(self.current);
        Ok(())
    }
}

/// Registers a channel busyness threshold trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddBusynessTrigger {
    /// Trigger identifier.
    pub id: u32,
    /// Radio whose busyness is watched.
    pub rsrc: ResourceElement,
    /// Comparison against `value`.
    pub relation: Relation,
    /// Threshold.
    pub value: u32,
    /// Evaluation period in milliseconds.
    pub period_ms: u16,
}

impl Body for AddBusynessTrigger {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            id: get_u32(src, "busyness trigger")?,
            rsrc: ResourceElement::decode(src)?,
            relation: get_relation(src)?,
            value: get_u32(src, "busyness trigger")?,
            period_ms: get_u16(src, "busyness trigger")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.id);
        self.rsrc.encode(dst);
        dst.put_u8(self.relation as u8);
        dst.put_u32(self.value);
        dst.put_u16(self.period_ms);
        Ok(())
    }
}

/// A busyness trigger started to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusynessTriggerFired {
    /// Trigger identifier.
    pub id: u32,
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// Radio reported on.
    pub rsrc: ResourceElement,
    /// Current busyness.
    pub current: u32,
}

impl Body for BusynessTriggerFired {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            id: get_u32(src, "busyness report")?,
            wtp: get_addr(src, "busyness report")?,
            rsrc: ResourceElement::decode(src)?,
            current: get_u32(src, "busyness report")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.id);
        put_addr(dst, &self.wtp);
        self.rsrc.encode(dst);
        dst.put_u32(self.current);
        Ok(())
    }
}

/// Registers a traffic summary trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddSummaryTrigger {
    /// Trigger identifier.
    pub id: u32,
    /// Station address, or broadcast to match every transmitter.
    pub addr: EtherAddress,
    /// Radio the frames are heard on.
    pub rsrc: ResourceElement,
    /// Number of reports after which the trigger removes itself. Negative means unlimited.
    pub limit: i16,
    /// Flush period in milliseconds.
    pub period_ms: u16,
}

impl Body for AddSummaryTrigger {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            id: get_u32(src, "summary trigger")?,
            addr: get_addr(src, "summary trigger")?,
            rsrc: ResourceElement::decode(src)?,
            limit: get_i16(src, "summary trigger")?,
            period_ms: get_u16(src, "summary trigger")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.id);
        put_addr(dst, &self.addr);
        self.rsrc.encode(dst);
        dst.put_i16(self.limit);
        dst.put_u16(self.period_ms);
        Ok(())
    }
}

/// Frames collected by a summary trigger during one period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Trigger identifier.
    pub id: u32,
    /// Reporting access point.
    pub wtp: EtherAddress,
    /// Radio the frames were heard on.
    pub rsrc: ResourceElement,
    /// The collected frames.
    pub frames: Vec<FrameRecord>,
}

impl Body for Summary {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let id = get_u32(src, "summary")?;
        let wtp = get_addr(src, "summary")?;
        let rsrc = ResourceElement::decode(src)?;
        let n = get_u16(src, "summary")? as usize;
        need(src, "summary frames", n * FrameRecord::WIRE_LEN)?;
        let mut frames = Vec::with_capacity(n);
        for _ in 0..n {
            frames.push(FrameRecord::decode(src)?);
        }
        Ok(Self { id, wtp, rsrc, frames })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.id);
        put_addr(dst, &self.wtp);
        self.rsrc.encode(dst);
        dst.put_u16(count("summary frames", self.frames.len(), u16::MAX as usize)?);
        for frame in &self.frames {
            frame.encode(dst);
        }
        Ok(())
    }
}

/// Deletes the trigger with the given identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelTrigger {
    /// Trigger identifier.
    pub id: u32,
}

impl Body for DelTrigger {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self { id: get_u32(src, "del trigger")? })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.id);
        Ok(())
    }
}

/// Every message of the control protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Keep-alive.
    Hello(Hello),
    /// Scan request from a station.
    ScanRequest(ScanRequest),
    /// Answer to a scan request.
    ScanResponse(MgmtResponse),
    /// Auth request.
    AuthRequest(AuthRequest),
    /// Auth response.
    AuthResponse(MgmtResponse),
    /// Assoc request.
    AssocRequest(AssocRequest),
    /// Assoc response.
    AssocResponse(MgmtResponse),
    /// Add station.
    AddStation(AddStation),
    /// Del station.
    DelStation(DelStation),
    /// Station status.
    StationStatus(StationStatus),
    /// Set port.
    SetPort(SetPort),
    /// Port status.
    PortStatus(PortStatus),
    /// Capability report.
    Caps(Caps),
    /// Add VAP.
    AddVap(AddVap),
    /// Del VAP.
    DelVap(DelVap),
    /// VAP status.
    VapStatus(VapStatus),
    /// Add station response.
    AddStationResponse(StationResponse),
    /// Del station response.
    DelStationResponse(StationResponse),
    /// Counters request.
    CountersRequest(CountersRequest),
    /// Counters response.
    CountersResponse(CountersResponse),
    /// Channel-quality map request.
    CqmRequest(CqmRequest),
    /// Channel-quality map report.
    CqmResponse(CqmResponse),
    /// Add traffic rule.
    AddTrafficRule(AddTrafficRule),
    /// Del traffic rule.
    DelTrafficRule(DelTrafficRule),
    /// Traffic rule status.
    TrafficRuleStatus(TrafficRuleStatus),
    /// Add RSSI trigger.
    AddRssiTrigger(AddRssiTrigger),
    /// Del RSSI trigger.
    DelRssiTrigger(DelTrigger),
    /// RSSI trigger report.
    RssiTrigger(RssiTriggerFired),
    /// Add busyness trigger.
    AddBusynessTrigger(AddBusynessTrigger),
    /// Del busyness trigger.
    DelBusynessTrigger(DelTrigger),
    /// Busyness trigger report.
    BusynessTrigger(BusynessTriggerFired),
    /// Add summary trigger.
    AddSummaryTrigger(AddSummaryTrigger),
    /// Del summary trigger.
    DelSummaryTrigger(DelTrigger),
    /// Traffic summary report.
    Summary(Summary),
}

impl Message {
    /// Wire type of the message.
    pub const fn msg_type(&self) -> MsgType {
        match self {
            Self::Hello(_) => MsgType::Hello,
            Self::ScanRequest(_) => MsgType::ScanRequest,
            Self::ScanResponse(_) => MsgType::ScanResponse,
            Self::AuthRequest(_) => MsgType::AuthRequest,
            Self::AuthResponse(_) => MsgType::AuthResponse,
            Self::AssocRequest(_) => MsgType::AssocRequest,
            Self::AssocResponse(_) => MsgType::AssocResponse,
            Self::AddStation(_) => MsgType::AddStation,
            Self::DelStation(_) => MsgType::DelStation,
            Self::StationStatus(_) => MsgType::StationStatus,
            Self::SetPort(_) => MsgType::SetPort,
            Self::PortStatus(_) => MsgType::PortStatus,
            Self::Caps(_) => MsgType::Caps,
            Self::AddVap(_) => MsgType::AddVap,
            Self::DelVap(_) => MsgType::DelVap,
            Self::VapStatus(_) => MsgType::VapStatus,
            Self::AddStationResponse(_) => MsgType::AddStationResponse,
            Self::DelStationResponse(_) => MsgType::DelStationResponse,
            Self::CountersRequest(_) => MsgType::CountersRequest,
            Self::CountersResponse(_) => MsgType::CountersResponse,
            Self::CqmRequest(_) => MsgType::CqmRequest,
            Self::CqmResponse(_) => MsgType::CqmResponse,
            Self::AddTrafficRule(_) => MsgType::AddTrafficRule,
            Self::DelTrafficRule(_) => MsgType::DelTrafficRule,
            Self::TrafficRuleStatus(_) => MsgType::TrafficRuleStatus,
            Self::AddRssiTrigger(_) => MsgType::AddRssiTrigger,
            Self::DelRssiTrigger(_) => MsgType::DelRssiTrigger,
            Self::RssiTrigger(_) => MsgType::RssiTrigger,
            Self::AddBusynessTrigger(_) => MsgType::AddBusynessTrigger,
            Self::DelBusynessTrigger(_) => MsgType::DelBusynessTrigger,
            Self::BusynessTrigger(_) => MsgType::BusynessTrigger,
            Self::AddSummaryTrigger(_) => MsgType::AddSummaryTrigger,
            Self::DelSummaryTrigger(_) => MsgType::DelSummaryTrigger,
            Self::Summary(_) => MsgType::Summary,
        }
    }

    /// Decodes a body of the given type. The whole body must be consumed.
    pub(crate) fn decode_body(msg_type: MsgType, mut src: Bytes) -> Result<Self, Error> {
        let src = &mut src;
        let msg = match msg_type {
            MsgType::Hello => Self::Hello(Body::decode(src)?),
            MsgType::ScanRequest => Self::ScanRequest(Body::decode(src)?),
            MsgType::ScanResponse => Self::ScanResponse(Body::decode(src)?),
            MsgType::AuthRequest => Self::AuthRequest(Body::decode(src)?),
            MsgType::AuthResponse => Self::AuthResponse(Body::decode(src)?),
            MsgType::AssocRequest => Self::AssocRequest(Body::decode(src)?),
            MsgType::AssocResponse => Self::AssocResponse(Body::decode(src)?),
            MsgType::AddStation => Self::AddStation(Body::decode(src)?),
            MsgType::DelStation => Self::DelStation(Body::decode(src)?),
            MsgType::StationStatus => Self::StationStatus(Body::decode(src)?),
            MsgType::SetPort => Self::SetPort(Body::decode(src)?),
            MsgType::PortStatus => Self::PortStatus(Body::decode(src)?),
            MsgType::Caps => Self::Caps(Body::decode(src)?),
            MsgType::AddVap => Self::AddVap(Body::decode(src)?),
            MsgType::DelVap => Self::DelVap(Body::decode(src)?),
            MsgType::VapStatus => Self::VapStatus(Body::decode(src)?),
            MsgType::AddStationResponse => Self::AddStationResponse(Body::decode(src)?),
            MsgType::DelStationResponse => Self::DelStationResponse(Body::decode(src)?),
            MsgType::CountersRequest => Self::CountersRequest(Body::decode(src)?),
            MsgType::CountersResponse => Self::CountersResponse(Body::decode(src)?),
            MsgType::CqmRequest => Self::CqmRequest(Body::decode(src)?),
            MsgType::CqmResponse => Self::CqmResponse(Body::decode(src)?),
            MsgType::AddTrafficRule => Self::AddTrafficRule(Body::decode(src)?),
            MsgType::DelTrafficRule => Self::DelTrafficRule(Body::decode(src)?),
            MsgType::TrafficRuleStatus => Self::TrafficRuleStatus(Body::decode(src)?),
            MsgType::AddRssiTrigger => Self::AddRssiTrigger(Body::decode(src)?),
            MsgType::DelRssiTrigger => Self::DelRssiTrigger(Body::decode(src)?),
            MsgType::RssiTrigger => Self::RssiTrigger(Body::decode(src)?),
            MsgType::AddBusynessTrigger => Self::AddBusynessTrigger(Body::decode(src)?),
            MsgType::DelBusynessTrigger => Self::DelBusynessTrigger(Body::decode(src)?),
            MsgType::BusynessTrigger => Self::BusynessTrigger(Body::decode(src)?),
            MsgType::AddSummaryTrigger => Self::AddSummaryTrigger(Body::decode(src)?),
            MsgType::DelSummaryTrigger => Self::DelSummaryTrigger(Body::decode(src)?),
            MsgType::Summary => Self::Summary(Body::decode(src)?),
        };

        if src.has_remaining() {
            return Err(Error::TrailingBytes(src.remaining()));
        }

        Ok(msg)
    }

    pub(crate) fn encode_body(&self, dst: &mut BytesMut) -> Result<(), Error> {
        match self {
            Self::Hello(m) => m.encode(dst),
            Self::ScanRequest(m) => m.encode(dst),
            Self::ScanResponse(m) | Self::AuthResponse(m) | Self::AssocResponse(m) => m.encode(dst),
            Self::AuthRequest(m) => m.encode(dst),
            Self::AssocRequest(m) => m.encode(dst),
            Self::AddStation(m) => m.encode(dst),
            Self::DelStation(m) => m.encode(dst),
            Self::StationStatus(m) => m.encode(dst),
            Self::SetPort(m) => m.encode(dst),
            Self::PortStatus(m) => m.encode(dst),
            Self::Caps(m) => m.encode(dst),
            Self::AddVap(m) => m.encode(dst),
            Self::DelVap(m) => m.encode(dst),
            Self::VapStatus(m) => m.encode(dst),
            Self::AddStationResponse(m) | Self::DelStationResponse(m) => m.encode(dst),
            Self::CountersRequest(m) => m.encode(dst),
            Self::CountersResponse(m) => m.encode(dst),
            Self::CqmRequest(m) => m.encode(dst),
            Self::CqmResponse(m) => m.encode(dst),
            Self::AddTrafficRule(m) => m.encode(dst),
            Self::DelTrafficRule(m) => m.encode(dst),
            Self::TrafficRuleStatus(m) => m.encode(dst),
            Self::AddRssiTrigger(m) => m.encode(dst),
            Self::DelRssiTrigger(m) | Self::DelBusynessTrigger(m) | Self::DelSummaryTrigger(m) => {
                m.encode(dst)
            }
            Self::RssiTrigger(m) => m.encode(dst),
            Self::AddBusynessTrigger(m) => m.encode(dst),
            Self::BusynessTrigger(m) => m.encode(dst),
            Self::AddSummaryTrigger(m) => m.encode(dst),
            Self::Summary(m) => m.encode(dst),
        }
    }
}
