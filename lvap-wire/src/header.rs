use bytes::{Buf, BufMut};

use crate::Error;

/// Protocol version carried in every header.
pub const PROTOCOL_VERSION: u8 = 1;

/// Length of the common header in bytes.
pub const HEADER_LEN: usize = 8;

/// The common message header.
///
/// ```text
/// | version:u8 | type:u8 | length:u16 | sequence:u32 |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version.
    pub version: u8,
    /// Raw message type. Kept raw so unknown types can be skipped.
    pub msg_type: u8,
    /// Total message length, header included.
    pub length: u16,
    /// Sequence number.
    pub seq: u32,
}

impl Header {
    /// Header of a `length` byte message of type `msg_type`.
    pub const fn new(msg_type: MsgType, length: u16, seq: u32) -> Self {
        Self { version: PROTOCOL_VERSION, msg_type: msg_type as u8, length, seq }
    }

    /// Reads a header without validating it. The caller must make sure at least
    /// [`HEADER_LEN`] bytes are available.
    pub(crate) fn read(src: &mut impl Buf) -> Self {
        Self { version: src.get_u8(), msg_type: src.get_u8(), length: src.get_u16(), seq: src.get_u32() }
    }

    /// Reads a header from the front of `src` without consuming it.
    pub fn peek(src: &[u8]) -> Option<Self> {
        if src.len() < HEADER_LEN {
            return None;
        }
        Some(Self::read(&mut &src[..HEADER_LEN]))
    }

    pub(crate) fn write(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.version);
        dst.put_u8(self.msg_type);
        dst.put_u16(self.length);
        dst.put_u32(self.seq);
    }

    /// Checks the version and that the declared length can hold at least the header
    /// and fits in `available` bytes.
    pub fn validate(&self, available: usize) -> Result<(), Error> {
        if self.version != PROTOCOL_VERSION {
            return Err(Error::Version(self.version));
        }
        let declared = self.length as usize;
        if declared < HEADER_LEN || declared > available {
            return Err(Error::InvalidLength { declared, remaining: available });
        }
        Ok(())
    }

    /// Length of the body following the header.
    #[inline]
    pub fn body_len(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_LEN)
    }

    /// The decoded message type, or `None` if this agent does not know it.
    pub fn kind(&self) -> Option<MsgType> {
        MsgType::try_from(self.msg_type).ok()
    }
}

/// All message types understood by this implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    /// Keep-alive.
    Hello = 0x00,
    /// Scan request from a station.
    ScanRequest = 0x01,
    /// Answer to a scan request.
    ScanResponse = 0x02,
    /// Auth request.
    AuthRequest = 0x03,
    /// Auth response.
    AuthResponse = 0x04,
    /// Assoc request.
    AssocRequest = 0x05,
    /// Assoc response.
    AssocResponse = 0x06,
    /// Add station.
    AddStation = 0x07,
    /// Del station.
    DelStation = 0x08,
    /// Station status.
    StationStatus = 0x09,
    /// Set port.
    SetPort = 0x0A,
    /// Port status.
    PortStatus = 0x0B,
    /// Capability report.
    Caps = 0x0C,
    /// Add VAP.
    AddVap = 0x0D,
    /// Del VAP.
    DelVap = 0x0E,
    /// VAP status.
    VapStatus = 0x0F,
    /// Add station response.
    AddStationResponse = 0x10,
    /// Del station response.
    DelStationResponse = 0x11,
    /// Counters request.
    CountersRequest = 0x12,
    /// Counters response.
    CountersResponse = 0x13,
    /// Channel-quality map request.
    CqmRequest = 0x14,
    /// Channel-quality map report.
    CqmResponse = 0x15,
    /// Add traffic rule.
    AddTrafficRule = 0x16,
    /// Del traffic rule.
    DelTrafficRule = 0x17,
    /// Traffic rule status.
    TrafficRuleStatus = 0x18,
    /// Add RSSI trigger.
    AddRssiTrigger = 0x20,
    /// Del RSSI trigger.
    DelRssiTrigger = 0x21,
    /// RSSI trigger report.
    RssiTrigger = 0x22,
    /// Add busyness trigger.
    AddBusynessTrigger = 0x23,
    /// Del busyness trigger.
    DelBusynessTrigger = 0x24,
    /// Busyness trigger report.
    BusynessTrigger = 0x25,
    /// Add summary trigger.
    AddSummaryTrigger = 0x26,
    /// Del summary trigger.
    DelSummaryTrigger = 0x27,
    /// Traffic summary report.
    Summary = 0x28,
}

impl TryFrom<u8> for MsgType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Self::Hello,
            0x01 => Self::ScanRequest,
            0x02 => Self::ScanResponse,
            0x03 => Self::AuthRequest,
            0x04 => Self::AuthResponse,
            0x05 => Self::AssocRequest,
            0x06 => Self::AssocResponse,
            0x07 => Self::AddStation,
            0x08 => Self::DelStation,
            0x09 => Self::StationStatus,
            0x0A => Self::SetPort,
            0x0B => Self::PortStatus,
            0x0C => Self::Caps,
            0x0D => Self::AddVap,
            0x0E => Self::DelVap,
            0x0F => Self::VapStatus,
            0x10 => Self::AddStationResponse,
            0x11 => Self::DelStationResponse,
            0x12 => Self::CountersRequest,
            0x13 => Self::CountersResponse,
            0x14 => Self::CqmRequest,
            0x15 => Self::CqmResponse,
            0x16 => Self::AddTrafficRule,
            0x17 => Self::DelTrafficRule,
            0x18 => Self::TrafficRuleStatus,
            0x20 => Self::AddRssiTrigger,
            0x21 => Self::DelRssiTrigger,
            0x22 => Self::RssiTrigger,
            0x23 => Self::AddBusynessTrigger,
            0x24 => Self::DelBusynessTrigger,
            0x25 => Self::BusynessTrigger,
            0x26 => Self::AddSummaryTrigger,
            0x27 => Self::DelSummaryTrigger,
            0x28 => Self::Summary,
            _ => return Err(value),
        })
    }
}
