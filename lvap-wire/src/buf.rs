//! Bounds-checked readers and length-prefixed writers shared by all message bodies.

use bytes::{Buf, BufMut};
use lvap_common::EtherAddress;

use crate::Error;

#[inline]
pub(crate) fn need(src: &impl Buf, what: &'static str, needed: usize) -> Result<(), Error> {
    if src.remaining() < needed {
        return Err(Error::Truncated { what, needed, remaining: src.remaining() });
    }
    Ok(())
}

#[inline]
pub(crate) fn get_u8(src: &mut impl Buf, what: &'static str) -> Result<u8, Error> {
    need(src, what, 1)?;
    Ok(src.get_u8())
}

#[inline]
pub(crate) fn get_i8(src: &mut impl Buf, what: &'static str) -> Result<i8, Error> {
    need(src, what, 1)?;
    Ok(src.get_i8())
}

#[inline]
pub(crate) fn get_u16(src: &mut impl Buf, what: &'static str) -> Result<u16, Error> {
    need(src, what, 2)?;
    Ok(src.get_u16())
}

#[inline]
pub(crate) fn get_i16(src: &mut impl Buf, what: &'static str) -> Result<i16, Error> {
    need(src, what, 2)?;
    Ok(src.get_i16())
}

#[inline]
pub(crate) fn get_u32(src: &mut impl Buf, what: &'static str) -> Result<u32, Error> {
    need(src, what, 4)?;
    Ok(src.get_u32())
}

#[inline]
pub(crate) fn get_u64(src: &mut impl Buf, what: &'static str) -> Result<u64, Error> {
    need(src, what, 8)?;
    Ok(src.get_u64())
}

pub(crate) fn get_addr(src: &mut impl Buf, what: &'static str) -> Result<EtherAddress, Error> {
    need(src, what, 6)?;
    let mut octets = [0u8; 6];
    src.copy_to_slice(&mut octets);
    Ok(EtherAddress::new(octets))
}

#[inline]
pub(crate) fn put_addr(dst: &mut impl BufMut, addr: &EtherAddress) {
    dst.put_slice(addr.as_bytes());
}

/// Reads a `u8`-length-prefixed string. Bytes that are not valid UTF-8 are
/// rejected rather than rewritten, so a decoded string always encodes back to
/// the same bytes.
pub(crate) fn get_str(src: &mut impl Buf, what: &'static str) -> Result<String, Error> {
    let len = get_u8(src, what)? as usize;
    need(src, what, len)?;
    let mut raw = vec![0u8; len];
    src.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|e| Error::InvalidUtf8 { field: what, valid_up_to: e.utf8_error().valid_up_to() })
}

pub(crate) fn put_str(dst: &mut impl BufMut, field: &'static str, s: &str) -> Result<(), Error> {
    let len = u8::try_from(s.len())
        .map_err(|_| Error::TooLong { field, len: s.len(), max: u8::MAX as usize })?;
    dst.put_u8(len);
    dst.put_slice(s.as_bytes());
    Ok(())
}

/// Converts a collection length into the width of its on-wire counter.
pub(crate) fn count<T: TryFrom<usize>>(field: &'static str, len: usize, max: usize) -> Result<T, Error> {
    T::try_from(len).map_err(|_| Error::TooLong { field, len, max })
}
