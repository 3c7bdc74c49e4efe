//! Payload decoding.
//!
//! Parsers for the data the sensor pushes and the battery level it reports.

pub mod payload;

pub use payload::{
    decode_battery_level, FixedOffsetPayloadParser, FnPayloadParser, PayloadParser,
    TextPayloadParser,
};
