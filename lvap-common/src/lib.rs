//! Primitives shared by the lvap crates.

mod addr;
pub use addr::{AddrParseError, EtherAddress};

mod avg;
pub use avg::{Ewma, MovingAverage};

mod ring;
pub use ring::RingBuffer;
