#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use lvap_agent::*;
pub use lvap_common::{AddrParseError, EtherAddress, Ewma, MovingAverage, RingBuffer};
pub use lvap_wire as wire;
