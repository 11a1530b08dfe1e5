//! Audio capability and packet value types.

/// Abstract PCM sample encodings understood by the bridge.
///
/// These are the application-facing format identifiers. The device layer
/// speaks [`DeviceFormat`](crate::format::DeviceFormat); the two sides are
/// related through the [format capability table](crate::format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum SampleFormat {
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
}

impl SampleFormat {
    /// Returns the size of one sample in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::S8 | Self::U8 => 1,
            Self::S16Le | Self::S16Be | Self::U16Le | Self::U16Be => 2,
            Self::S32Le | Self::S32Be | Self::U32Le | Self::U32Be | Self::F32Le | Self::F32Be => 4,
            Self::F64Le | Self::F64Be => 8,
        }
    }
}

/// Channel arrangements supported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    /// Single channel.
    Mono,
    /// Two channels, left then right.
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels in this layout.
    pub fn channels(self) -> u32 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }

    /// Returns the default layout for a channel count, if one exists.
    ///
    /// Channel counts without a defined layout yield `None`; callers treat
    /// such advertisements as unusable and skip them.
    pub fn from_channels(channels: u32) -> Option<Self> {
        match channels {
            1 => Some(Self::Mono),
            2 => Some(Self::Stereo),
            _ => None,
        }
    }
}

/// A concrete audio format: encoding, layout, planarity and sample rate.
///
/// This is the unit of format negotiation. A session is initialized with
/// requested caps and the device answers with the caps it actually agreed
/// to (the negotiated format).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioCaps {
    /// Sample encoding.
    pub format: SampleFormat,
    /// Channel arrangement.
    pub layout: ChannelLayout,
    /// Whether samples are stored one plane per channel.
    pub planar: bool,
    /// Sample rate in Hz.
    pub rate: u32,
}

impl AudioCaps {
    /// Creates interleaved caps with the given format, layout and rate.
    pub fn new(format: SampleFormat, layout: ChannelLayout, rate: u32) -> Self {
        Self {
            format,
            layout,
            planar: false,
            rate,
        }
    }

    /// Returns the number of channels.
    pub fn channels(&self) -> u32 {
        self.layout.channels()
    }

    /// Returns the size of one sample in bytes.
    pub fn bytes_per_sample(&self) -> usize {
        self.format.bytes_per_sample()
    }

    /// Returns the size of one frame (one sample per channel) in bytes.
    pub fn frame_size(&self) -> usize {
        self.bytes_per_sample() * self.channels() as usize
    }
}

/// A buffer of PCM bytes tagged with the caps describing it.
///
/// `AudioPacket` is what callers hand to [`write`](crate::AudioBridge::write);
/// the converter turns it into the device's negotiated format before it is
/// queued for playback.
#[derive(Debug, Clone)]
pub struct AudioPacket {
    /// Format of the payload.
    pub caps: AudioCaps,
    /// Raw PCM bytes, interleaved unless `caps.planar` is set.
    pub data: Vec<u8>,
}

impl AudioPacket {
    /// Creates a packet from caps and raw bytes.
    pub fn new(caps: AudioCaps, data: Vec<u8>) -> Self {
        Self { caps, data }
    }

    /// Returns `true` if the packet carries no audio.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the number of whole frames in the payload.
    pub fn frame_count(&self) -> usize {
        let frame = self.caps.frame_size();
        if frame == 0 {
            return 0;
        }
        self.data.len() / frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_sample() {
        assert_eq!(SampleFormat::S8.bytes_per_sample(), 1);
        assert_eq!(SampleFormat::S16Le.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::F32Be.bytes_per_sample(), 4);
        assert_eq!(SampleFormat::F64Le.bytes_per_sample(), 8);
    }

    #[test]
    fn test_layout_from_channels() {
        assert_eq!(ChannelLayout::from_channels(1), Some(ChannelLayout::Mono));
        assert_eq!(ChannelLayout::from_channels(2), Some(ChannelLayout::Stereo));
        assert_eq!(ChannelLayout::from_channels(0), None);
        assert_eq!(ChannelLayout::from_channels(6), None);
    }

    #[test]
    fn test_caps_frame_size() {
        let caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Stereo, 48000);
        assert_eq!(caps.frame_size(), 4);
        assert_eq!(caps.channels(), 2);
    }

    #[test]
    fn test_packet_frame_count() {
        let caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Mono, 8000);
        let packet = AudioPacket::new(caps, vec![0u8; 320]);
        assert_eq!(packet.frame_count(), 160);
        assert!(!packet.is_empty());
    }
}
