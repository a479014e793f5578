//! Transmit time estimates for 802.11a/b/g/n rates.

use super::Rate;

/// MAC header plus FCS added to every data payload.
const MAC_OVERHEAD: u32 = 28;
/// Long preamble plus PLCP header of DSSS/CCK frames.
const DSSS_PREAMBLE_US: u32 = 192;
/// OFDM preamble plus SIGNAL field.
const OFDM_PREAMBLE_US: u32 = 20;
/// Legacy part of the HT mixed-format preamble, without HT-LTFs.
const HT_PREAMBLE_US: u32 = 32;
const SYMBOL_US: u32 = 4;
/// SERVICE plus tail bits.
const OFDM_EXTRA_BITS: u32 = 22;

/// Data bits per OFDM symbol of HT MCS 0..7, single stream, 20 MHz.
const HT20_DBPS: [u32; 8] = [26, 52, 78, 104, 156, 208, 234, 260];
/// Data bits per OFDM symbol of HT MCS 0..7, single stream, 40 MHz.
const HT40_DBPS: [u32; 8] = [54, 108, 162, 216, 324, 432, 486, 540];

/// Time on air, in microseconds, of a `len` byte payload sent at `rate`.
pub fn airtime(rate: Rate, len: usize, ht40: bool) -> u32 {
    let bits = (len as u32 + MAC_OVERHEAD) * 8;
    if rate.is_ht() {
        let mcs = rate.value() as usize;
        let streams = (mcs / 8 + 1) as u32;
        let table = if ht40 { &HT40_DBPS } else { &HT20_DBPS };
        let dbps = table[mcs % 8] * streams;
        HT_PREAMBLE_US + SYMBOL_US * streams + SYMBOL_US * (bits + OFDM_EXTRA_BITS).div_ceil(dbps)
    } else if rate.is_dsss() {
        // value is in 500 kbps units, so bits / (value / 2) microseconds
        DSSS_PREAMBLE_US + (bits * 2).div_ceil(rate.value().max(1) as u32)
    } else {
        let dbps = rate.value().max(1) as u32 * 2;
        OFDM_PREAMBLE_US + SYMBOL_US * (bits + OFDM_EXTRA_BITS).div_ceil(dbps)
    }
}
