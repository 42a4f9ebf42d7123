//! Binary framing primitives for grouped message streams.

pub mod primitives;

pub use primitives::{read_slot, read_varint, read_varint_or_eof, Writer};
