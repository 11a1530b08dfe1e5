//! Static capability table mapping abstract formats to device encodings.

use crate::caps::SampleFormat;

/// PCM encodings as the device layer identifies them.
///
/// The planar variants exist on the wire but carry no entry in the
/// capability table, so the bridge rejects endpoints advertising them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum DeviceFormat {
    S8,
    U8,
    S16Le,
    S16Be,
    U16Le,
    U16Be,
    S32Le,
    S32Be,
    U32Le,
    U32Be,
    F32Le,
    F32Be,
    F64Le,
    F64Be,
    S16P,
    S32P,
    F32P,
    F64P,
}

/// One row of the capability table: a device encoding paired with the
/// abstract format it corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatEntry {
    /// Device-layer encoding.
    pub device_format: DeviceFormat,
    /// Abstract sample format.
    pub format: SampleFormat,
    /// Whether the encoding is planar.
    pub planar: bool,
}

/// The capability table.
///
/// Order matters: during negotiation the table is advertised front to
/// back, and the first entry is the fallback offered when the requested
/// format is unsupported.
pub const FORMAT_TABLE: &[FormatEntry] = &[
    FormatEntry { device_format: DeviceFormat::S8, format: SampleFormat::S8, planar: false },
    FormatEntry { device_format: DeviceFormat::U8, format: SampleFormat::U8, planar: false },
    FormatEntry { device_format: DeviceFormat::S16Le, format: SampleFormat::S16Le, planar: false },
    FormatEntry { device_format: DeviceFormat::S16Be, format: SampleFormat::S16Be, planar: false },
    FormatEntry { device_format: DeviceFormat::U16Le, format: SampleFormat::U16Le, planar: false },
    FormatEntry { device_format: DeviceFormat::U16Be, format: SampleFormat::U16Be, planar: false },
    FormatEntry { device_format: DeviceFormat::S32Le, format: SampleFormat::S32Le, planar: false },
    FormatEntry { device_format: DeviceFormat::S32Be, format: SampleFormat::S32Be, planar: false },
    FormatEntry { device_format: DeviceFormat::U32Le, format: SampleFormat::U32Le, planar: false },
    FormatEntry { device_format: DeviceFormat::U32Be, format: SampleFormat::U32Be, planar: false },
    FormatEntry { device_format: DeviceFormat::F32Le, format: SampleFormat::F32Le, planar: false },
    FormatEntry { device_format: DeviceFormat::F32Be, format: SampleFormat::F32Be, planar: false },
    FormatEntry { device_format: DeviceFormat::F64Le, format: SampleFormat::F64Le, planar: false },
    FormatEntry { device_format: DeviceFormat::F64Be, format: SampleFormat::F64Be, planar: false },
];

/// Looks up the table entry for an abstract format and planar flag.
pub fn by_format(format: SampleFormat, planar: bool) -> Option<&'static FormatEntry> {
    FORMAT_TABLE
        .iter()
        .find(|entry| entry.format == format && entry.planar == planar)
}

/// Looks up the table entry for a device-layer encoding.
pub fn by_device_format(device_format: DeviceFormat) -> Option<&'static FormatEntry> {
    FORMAT_TABLE
        .iter()
        .find(|entry| entry.device_format == device_format)
}

/// Returns `true` if the device encoding has a table entry.
pub fn supports(device_format: DeviceFormat) -> bool {
    by_device_format(device_format).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_entries() {
        for entry in FORMAT_TABLE {
            let found = by_format(entry.format, entry.planar).unwrap();
            let back = by_device_format(found.device_format).unwrap();
            assert_eq!(back.format, entry.format);
            assert_eq!(back.planar, entry.planar);
        }
    }

    #[test]
    fn test_planar_miss() {
        assert!(by_format(SampleFormat::S16Le, true).is_none());
        assert!(by_device_format(DeviceFormat::F32P).is_none());
        assert!(!supports(DeviceFormat::S16P));
    }

    #[test]
    fn test_table_order_starts_with_s8() {
        // First-listed entry is the default offered during negotiation.
        assert_eq!(FORMAT_TABLE[0].format, SampleFormat::S8);
    }

    #[test]
    fn test_supports_interleaved() {
        assert!(supports(DeviceFormat::S16Le));
        assert!(supports(DeviceFormat::F64Be));
    }

    #[test]
    fn test_unique_mapping_per_planar_flag() {
        for entry in FORMAT_TABLE {
            let matches = FORMAT_TABLE
                .iter()
                .filter(|e| e.format == entry.format && e.planar == entry.planar)
                .count();
            assert_eq!(matches, 1);
        }
    }
}
