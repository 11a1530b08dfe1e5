//! Format capability table and sample conversion.
//!
//! This module owns the static mapping between the abstract
//! [`SampleFormat`](crate::SampleFormat) enumeration and the device-layer
//! [`DeviceFormat`] encoding, plus the converter that rewrites packets into
//! the negotiated device format on the playback path.

mod convert;
mod table;

pub use convert::AudioConverter;
pub use table::{by_device_format, by_format, supports, DeviceFormat, FormatEntry, FORMAT_TABLE};
