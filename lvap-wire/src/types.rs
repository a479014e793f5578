use bytes::{Buf, BufMut};
use lvap_common::EtherAddress;

use crate::{buf::*, Error};

/// PHY band a radio operates in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Band {
    /// Legacy 20 MHz (802.11a/b/g).
    #[default]
    Legacy20 = 0,
    /// High throughput 20 MHz (802.11n).
    Ht20 = 1,
    /// High throughput 40 MHz (802.11n).
    Ht40 = 2,
}

impl TryFrom<u8> for Band {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Legacy20),
            1 => Ok(Self::Ht20),
            2 => Ok(Self::Ht40),
            _ => Err(value),
        }
    }
}

impl Band {
    /// Whether the band is an HT band.
    #[inline]
    pub const fn is_ht(&self) -> bool {
        matches!(self, Self::Ht20 | Self::Ht40)
    }
}

/// One physical radio, identified by its address, channel and band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ResourceElement {
    /// Radio address.
    pub hwaddr: EtherAddress,
    /// Channel number.
    pub channel: u8,
    /// Band and channel width.
    pub band: Band,
}

impl ResourceElement {
    /// Encoded size in bytes.
    pub const WIRE_LEN: usize = 8;

    /// Radio `hwaddr` on `channel` in `band`.
    pub const fn new(hwaddr: EtherAddress, channel: u8, band: Band) -> Self {
        Self { hwaddr, channel, band }
    }

    pub(crate) fn decode(src: &mut impl Buf) -> Result<Self, Error> {
        need(src, "resource element", Self::WIRE_LEN)?;
        let hwaddr = get_addr(src, "resource element")?;
        let channel = src.get_u8();
        let band = src.get_u8();
        let band = Band::try_from(band)
            .map_err(|v| Error::InvalidValue { field: "band", value: v as u32 })?;
        Ok(Self { hwaddr, channel, band })
    }

    pub(crate) fn encode(&self, dst: &mut impl BufMut) {
        put_addr(dst, &self.hwaddr);
        dst.put_u8(self.channel);
        dst.put_u8(self.band as u8);
    }
}

/// Relational operator of a threshold trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Relation {
    /// Equal.
    Eq = 0,
    /// Greater than.
    Gt = 1,
    /// Less than.
    Lt = 2,
    /// Greater than or equal.
    Ge = 3,
    /// Less than or equal.
    Le = 4,
}

impl TryFrom<u8> for Relation {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Eq),
            1 => Ok(Self::Gt),
            2 => Ok(Self::Lt),
            3 => Ok(Self::Ge),
            4 => Ok(Self::Le),
            _ => Err(value),
        }
    }
}

impl Relation {
    /// Evaluates `current <relation> threshold`.
    #[inline]
    pub fn holds<T: PartialOrd>(&self, current: T, threshold: T) -> bool {
        match self {
            Self::Eq => current == threshold,
            Self::Gt => current > threshold,
            Self::Lt => current < threshold,
            Self::Ge => current >= threshold,
            Self::Le => current <= threshold,
        }
    }
}

/// How group-addressed traffic is delivered on a radio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MulticastMode {
    /// Flood as-is, once per distinct BSSID.
    #[default]
    Legacy = 0,
    /// Directed multicast service: duplicate as unicast.
    Dms = 1,
    /// Unreliable multicast with source repetition.
    Ur = 2,
}

impl TryFrom<u8> for MulticastMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Legacy),
            1 => Ok(Self::Dms),
            2 => Ok(Self::Ur),
            _ => Err(value),
        }
    }
}

/// Station state flags carried by add-station and station-status messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StationFlags(u16);

impl StationFlags {
    /// The station is authenticated.
    pub const AUTHENTICATED: u16 = 0x0001;
    /// The station is associated.
    pub const ASSOCIATED: u16 = 0x0002;
    /// The station's BSSIDs take part in the hardware address filter.
    pub const SET_MASK: u16 = 0x0004;
    /// The station is only served upstream.
    pub const UPLINK_ONLY: u16 = 0x0008;

    /// Flags from raw bits.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// Whether [`Self::AUTHENTICATED`] is set.
    pub const fn authenticated(&self) -> bool {
        self.0 & Self::AUTHENTICATED != 0
    }

    /// Whether [`Self::ASSOCIATED`] is set.
    pub const fn associated(&self) -> bool {
        self.0 & Self::ASSOCIATED != 0
    }

    /// Whether [`Self::SET_MASK`] is set.
    pub const fn set_mask(&self) -> bool {
        self.0 & Self::SET_MASK != 0
    }

    /// Whether [`Self::UPLINK_ONLY`] is set.
    pub const fn uplink_only(&self) -> bool {
        self.0 & Self::UPLINK_ONLY != 0
    }

    /// Copy with `bit` set or cleared.
    #[must_use]
    pub const fn with(self, bit: u16, on: bool) -> Self {
        if on {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        }
    }
}

/// A named wired/virtual port advertised in the capabilities message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPort {
    /// Port address.
    pub hwaddr: EtherAddress,
    /// Port number.
    pub port_id: u16,
    /// Interface name.
    pub name: String,
}

impl NetworkPort {
    pub(crate) fn decode(src: &mut impl Buf) -> Result<Self, Error> {
        Ok(Self {
            hwaddr: get_addr(src, "port")?,
            port_id: get_u16(src, "port")?,
            name: get_str(src, "port name")?,
        })
    }

    pub(crate) fn encode(&self, dst: &mut impl BufMut) -> Result<(), Error> {
        put_addr(dst, &self.hwaddr);
        dst.put_u16(self.port_id);
        put_str(dst, "port name", &self.name)
    }
}

/// One bucket of a per-size byte histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeCount {
    /// Frame size in bytes.
    pub size: u16,
    /// Frames of this size.
    pub count: u32,
}

/// Per-neighbor link statistics reported in a channel-quality map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CqmEntry {
    /// Neighbor address.
    pub addr: EtherAddress,
    /// Mean RSSI of the last window, in dBm.
    pub last_rssi_avg: i8,
    /// Standard deviation of the RSSI in the last window.
    pub last_rssi_std: u8,
    /// Exponentially weighted RSSI.
    pub ewma_rssi: i8,
    /// Moving average of the window means.
    pub sma_rssi: i8,
    /// Frames heard in the last window.
    pub last_packets: u32,
    /// Frames heard since the neighbor was first seen.
    pub hist_packets: u32,
}

impl CqmEntry {
    pub(crate) fn decode(src: &mut impl Buf) -> Result<Self, Error> {
        need(src, "cqm entry", 18)?;
        Ok(Self {
            addr: get_addr(src, "cqm entry")?,
            last_rssi_avg: src.get_i8(),
            last_rssi_std: src.get_u8(),
            ewma_rssi: src.get_i8(),
            sma_rssi: src.get_i8(),
            last_packets: src.get_u32(),
            hist_packets: src.get_u32(),
        })
    }

    pub(crate) fn encode(&self, dst: &mut impl BufMut) {
        put_addr(dst, &self.addr);
        dst.put_i8(self.last_rssi_avg);
        dst.put_u8(self.last_rssi_std);
        dst.put_i8(self.ewma_rssi);
        dst.put_i8(self.sma_rssi);
        dst.put_u32(self.last_packets);
        dst.put_u32(self.hist_packets);
    }
}

/// Metadata of one received frame, as captured by a summary trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameRecord {
    /// Receiver address.
    pub ra: EtherAddress,
    /// Transmitter address.
    pub ta: EtherAddress,
    /// Radio timestamp in microseconds.
    pub tsft: u64,
    /// 802.11 sequence number.
    pub seq: u16,
    /// Signal strength in dBm.
    pub rssi: i8,
    /// Rate in 500 kbps units, or MCS index.
    pub rate: u8,
    /// 802.11 frame type.
    pub frame_type: u8,
    /// 802.11 frame subtype.
    pub subtype: u8,
    /// Frame length in bytes.
    pub length: u32,
}

impl FrameRecord {
    /// Encoded size in bytes.
    pub const WIRE_LEN: usize = 30;

    pub(crate) fn decode(src: &mut impl Buf) -> Result<Self, Error> {
        need(src, "frame record", Self::WIRE_LEN)?;
        Ok(Self {
            ra: get_addr(src, "frame record")?,
            ta: get_addr(src, "frame record")?,
            tsft: src.get_u64(),
            seq: src.get_u16(),
            rssi: src.get_i8(),
            rate: src.get_u8(),
            frame_type: src.get_u8(),
            subtype: src.get_u8(),
            length: src.get_u32(),
        })
    }

    pub(crate) fn encode(&self, dst: &mut impl BufMut) {
        put_addr(dst, &self.ra);
        put_addr(dst, &self.ta);
        dst.put_u64(self.tsft);
        dst.put_u16(self.seq);
        dst.put_i8(self.rssi);
        dst.put_u8(self.rate);
        dst.put_u8(self.frame_type);
        dst.put_u8(self.subtype);
        dst.put_u32(self.length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_semantics() {
        assert!(Relation::Gt.holds(-60, -70));
        assert!(!Relation::Gt.holds(-70, -70));
        assert!(Relation::Ge.holds(-70, -70));
        assert!(Relation::Lt.holds(-80, -70));
        assert!(Relation::Le.holds(-70, -70));
        assert!(Relation::Eq.holds(5u32, 5));
        assert_eq!(Relation::try_from(5), Err(5));
    }

    #[test]
    fn station_flags() {
        let flags = StationFlags::default()
            .with(StationFlags::AUTHENTICATED, true)
            .with(StationFlags::SET_MASK, true);
        assert!(flags.authenticated());
        assert!(!flags.associated());
        assert!(flags.set_mask());
        assert!(!flags.with(StationFlags::SET_MASK, false).set_mask());
    }

    #[test]
    fn bad_band_is_rejected() {
        let mut src: &[u8] = &[0, 1, 2, 3, 4, 5, 36, 9];
        assert_eq!(
            ResourceElement::decode(&mut src),
            Err(Error::InvalidValue { field: "band", value: 9 })
        );
    }
}
