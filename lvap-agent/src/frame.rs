//! Units exchanged with the host's packet pipeline.
//!
//! The agent never parses 802.11 frames itself: the host hands in frames with
//! their addressing already decoded and gets back frames annotated with the
//! transmitter address and the rates to try.

use bytes::Bytes;
use lvap_common::EtherAddress;
use lvap_wire::FrameRecord;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::rate::RateSet;

/// An outbound data frame before classification.
#[derive(Debug, Clone)]
pub struct TxFrame {
    /// Final destination (unicast station, group or broadcast).
    pub dst: EtherAddress,
    /// Ethernet source.
    pub src: EtherAddress,
    /// Interface the frame is meant to leave on.
    pub iface: usize,
    /// DSCP marking of the payload.
    pub dscp: u8,
    /// Frame body.
    pub payload: Bytes,
}

impl TxFrame {
    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A classified frame: addressed on air and waiting in a scheduler queue.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Receiver address on air.
    pub ra: EtherAddress,
    /// Transmitter address on air (the BSSID the frame is sent from).
    pub ta: EtherAddress,
    /// The frame itself.
    pub frame: TxFrame,
}

/// A frame released by the scheduler together with its rate selection.
#[derive(Debug, Clone)]
pub struct Scheduled {
    /// The frame and its on-air addressing.
    pub out: Outbound,
    /// Retry chain to send it with.
    pub rates: RateSet,
}

/// Metadata of a frame observed on a radio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxFrame {
    /// Transmitter (the neighbor being measured).
    pub ta: EtherAddress,
    /// Receiver address.
    pub ra: EtherAddress,
    /// Interface the frame was heard on.
    pub iface: usize,
    /// Signal strength in dBm.
    pub rssi: i8,
    /// Rate in 500 kbps units, or the MCS index for HT frames.
    pub rate: u8,
    /// Frame length in bytes.
    pub length: u32,
    /// Radio timestamp in microseconds.
    pub tsft: u64,
    /// 802.11 sequence number.
    pub seq: u16,
    /// 802.11 frame type.
    pub frame_type: u8,
    /// 802.11 frame subtype.
    pub subtype: u8,
}

impl From<&RxFrame> for FrameRecord {
    fn from(frame: &RxFrame) -> Self {
        Self {
            ra: frame.ra,
            ta: frame.ta,
            tsft: frame.tsft,
            seq: frame.seq,
            rssi: frame.rssi,
            rate: frame.rate,
            frame_type: frame.frame_type,
            subtype: frame.subtype,
            length: frame.length,
        }
    }
}

/// One step of the host's run-to-completion pipeline: consumes a unit and
/// yields zero or more units for the next step.
pub trait Stage<In> {
    type Out;

    fn process(&self, unit: In) -> Vec<Self::Out>;
}

/// Outcome of one transmission, reported back by the radio.
#[derive(Debug, Clone, Copy)]
pub struct TxStatus {
    /// Receiver of the frame.
    pub dst: EtherAddress,
    /// Interface the frame left on.
    pub iface: usize,
    /// The rate selection the frame went out with.
    pub rates: RateSet,
    /// Total transmission attempts, spread over `rates` in order.
    pub attempts: u8,
    /// Whether the frame was acknowledged.
    pub success: bool,
}

/// Reason code carried by deauthentication notices.
pub const REASON_UNSPECIFIED: u16 = 1;

/// Sink for management frames the agent asks the host to transmit.
pub trait FrameSink: Send + Sync + 'static {
    /// A station must be told it is no longer attached.
    fn deauthenticate(&self, sta: EtherAddress, bssid: EtherAddress, iface: usize, reason: u16);

    fn scan_response(&self, sta: EtherAddress, bssid: EtherAddress, status: u16);

    fn auth_response(&self, sta: EtherAddress, bssid: EtherAddress, status: u16);

    fn assoc_response(&self, sta: EtherAddress, bssid: EtherAddress, status: u16);
}

/// A [`FrameSink`] that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn deauthenticate(&self, _: EtherAddress, _: EtherAddress, _: usize, _: u16) {}

    fn scan_response(&self, _: EtherAddress, _: EtherAddress, _: u16) {}

    fn auth_response(&self, _: EtherAddress, _: EtherAddress, _: u16) {}

    fn assoc_response(&self, _: EtherAddress, _: EtherAddress, _: u16) {}
}

/// Multicast group membership, as learnt by the host (e.g. from IGMP snooping).
pub trait GroupMembership: Send + Sync + 'static {
    /// Returns the stations subscribed to `group`.
    fn subscribers(&self, group: EtherAddress) -> Vec<EtherAddress>;
}

/// In-memory group table the host can feed joins and leaves into.
#[derive(Debug, Default)]
pub struct GroupTable {
    groups: RwLock<FxHashMap<EtherAddress, FxHashSet<EtherAddress>>>,
}

impl GroupTable {
    /// Adds `sta` to `group`.
    pub fn join(&self, group: EtherAddress, sta: EtherAddress) {
        self.groups.write().entry(group).or_default().insert(sta);
    }

    /// Removes `sta` from `group`.
    pub fn leave(&self, group: EtherAddress, sta: EtherAddress) {
        let mut groups = self.groups.write();
        if let Some(members) = groups.get_mut(&group) {
            members.remove(&sta);
            if members.is_empty() {
                groups.remove(&group);
            }
        }
    }

    /// Removes `sta` from every group.
    pub fn forget(&self, sta: EtherAddress) {
        self.groups.write().retain(|_, members| {
            members.remove(&sta);
            !members.is_empty()
        });
    }
}

impl GroupMembership for GroupTable {
    fn subscribers(&self, group: EtherAddress) -> Vec<EtherAddress> {
        self.groups
            .read()
            .get(&group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }
}
