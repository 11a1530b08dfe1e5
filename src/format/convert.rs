//! Sample format, channel and rate conversion.
//!
//! The converter sits on the playback write path: packets arrive in
//! whatever format the caller produces and leave in the format the device
//! negotiated. Decoding goes through f64 so every table format can reach
//! every other without per-pair code.

use crate::caps::{AudioCaps, AudioPacket, ChannelLayout, SampleFormat};

/// Converts packets into a configured output format.
///
/// The output caps are set (and re-set) from the stream's negotiated
/// format callback. Until then, [`convert`](AudioConverter::convert)
/// returns `None` and writes fail.
#[derive(Debug, Default)]
pub struct AudioConverter {
    output_caps: Option<AudioCaps>,
}

impl AudioConverter {
    /// Creates a converter with no output format configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target format for subsequent conversions.
    pub fn set_output_caps(&mut self, caps: AudioCaps) {
        self.output_caps = Some(caps);
    }

    /// Returns the configured output format, if any.
    pub fn output_caps(&self) -> Option<AudioCaps> {
        self.output_caps
    }

    /// Drops any internal conversion state.
    ///
    /// Called when the negotiated format changes so stale resampler
    /// positions never bleed into the new stream.
    pub fn reset(&mut self) {}

    /// Converts a packet to the configured output format.
    ///
    /// Returns `None` if no output format is configured, the packet is
    /// empty or planar, or its caps describe a zero-size frame.
    pub fn convert(&self, packet: &AudioPacket) -> Option<AudioPacket> {
        let out_caps = self.output_caps?;

        if packet.is_empty() || packet.caps.planar || out_caps.planar {
            return None;
        }

        if packet.caps.rate == 0 || out_caps.rate == 0 {
            return None;
        }

        let in_channels = packet.caps.channels() as usize;
        let mut samples = decode(&packet.data, packet.caps.format);

        // Drop a trailing partial frame rather than mangling channel order.
        samples.truncate(samples.len() - samples.len() % in_channels);

        if samples.is_empty() {
            return None;
        }

        let samples = remix(&samples, packet.caps.layout, out_caps.layout);
        let samples = resample(
            &samples,
            out_caps.channels() as usize,
            packet.caps.rate,
            out_caps.rate,
        );

        Some(AudioPacket::new(out_caps, encode(&samples, out_caps.format)))
    }
}

fn decode(data: &[u8], format: SampleFormat) -> Vec<f64> {
    let size = format.bytes_per_sample();

    data.chunks_exact(size)
        .map(|raw| match format {
            SampleFormat::S8 => f64::from(raw[0] as i8) / 128.0,
            SampleFormat::U8 => (f64::from(raw[0]) - 128.0) / 128.0,
            SampleFormat::S16Le => f64::from(i16::from_le_bytes([raw[0], raw[1]])) / 32768.0,
            SampleFormat::S16Be => f64::from(i16::from_be_bytes([raw[0], raw[1]])) / 32768.0,
            SampleFormat::U16Le => {
                (f64::from(u16::from_le_bytes([raw[0], raw[1]])) - 32768.0) / 32768.0
            }
            SampleFormat::U16Be => {
                (f64::from(u16::from_be_bytes([raw[0], raw[1]])) - 32768.0) / 32768.0
            }
            SampleFormat::S32Le => {
                f64::from(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])) / 2147483648.0
            }
            SampleFormat::S32Be => {
                f64::from(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])) / 2147483648.0
            }
            SampleFormat::U32Le => {
                (f64::from(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])) - 2147483648.0)
                    / 2147483648.0
            }
            SampleFormat::U32Be => {
                (f64::from(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])) - 2147483648.0)
                    / 2147483648.0
            }
            SampleFormat::F32Le => {
                f64::from(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            SampleFormat::F32Be => {
                f64::from(f32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            SampleFormat::F64Le => f64::from_le_bytes([
                raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
            ]),
            SampleFormat::F64Be => f64::from_be_bytes([
                raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
            ]),
        })
        .collect()
}

fn encode(samples: &[f64], format: SampleFormat) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * format.bytes_per_sample());

    for &sample in samples {
        let sample = sample.clamp(-1.0, 1.0);

        match format {
            SampleFormat::S8 => {
                data.push(((sample * 127.0) as i8) as u8);
            }
            SampleFormat::U8 => {
                data.push((sample * 127.0 + 128.0) as u8);
            }
            SampleFormat::S16Le => {
                data.extend_from_slice(&((sample * 32767.0) as i16).to_le_bytes());
            }
            SampleFormat::S16Be => {
                data.extend_from_slice(&((sample * 32767.0) as i16).to_be_bytes());
            }
            SampleFormat::U16Le => {
                data.extend_from_slice(&((sample * 32767.0 + 32768.0) as u16).to_le_bytes());
            }
            SampleFormat::U16Be => {
                data.extend_from_slice(&((sample * 32767.0 + 32768.0) as u16).to_be_bytes());
            }
            SampleFormat::S32Le => {
                data.extend_from_slice(&((sample * 2147483647.0) as i32).to_le_bytes());
            }
            SampleFormat::S32Be => {
                data.extend_from_slice(&((sample * 2147483647.0) as i32).to_be_bytes());
            }
            SampleFormat::U32Le => {
                data.extend_from_slice(
                    &((sample * 2147483647.0 + 2147483648.0) as u32).to_le_bytes(),
                );
            }
            SampleFormat::U32Be => {
                data.extend_from_slice(
                    &((sample * 2147483647.0 + 2147483648.0) as u32).to_be_bytes(),
                );
            }
            SampleFormat::F32Le => {
                data.extend_from_slice(&(sample as f32).to_le_bytes());
            }
            SampleFormat::F32Be => {
                data.extend_from_slice(&(sample as f32).to_be_bytes());
            }
            SampleFormat::F64Le => {
                data.extend_from_slice(&sample.to_le_bytes());
            }
            SampleFormat::F64Be => {
                data.extend_from_slice(&sample.to_be_bytes());
            }
        }
    }

    data
}

fn remix(samples: &[f64], from: ChannelLayout, to: ChannelLayout) -> Vec<f64> {
    match (from, to) {
        (ChannelLayout::Mono, ChannelLayout::Stereo) => {
            samples.iter().flat_map(|&s| [s, s]).collect()
        }
        (ChannelLayout::Stereo, ChannelLayout::Mono) => samples
            .chunks_exact(2)
            .map(|pair| (pair[0] + pair[1]) / 2.0)
            .collect(),
        _ => samples.to_vec(),
    }
}

/// Linear-interpolation resampler.
///
/// Good enough for voice and monitoring paths; callers needing mastering
/// quality should resample upstream.
fn resample(samples: &[f64], channels: usize, from_rate: u32, to_rate: u32) -> Vec<f64> {
    if from_rate == to_rate || channels == 0 {
        return samples.to_vec();
    }

    let frames_in = samples.len() / channels;

    if frames_in == 0 {
        return Vec::new();
    }

    let frames_out = (frames_in as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    let mut out = Vec::with_capacity(frames_out * channels);
    let step = f64::from(from_rate) / f64::from(to_rate);

    for frame in 0..frames_out {
        let pos = frame as f64 * step;
        let i0 = pos as usize;
        let i1 = (i0 + 1).min(frames_in - 1);
        let frac = pos - i0 as f64;

        for ch in 0..channels {
            let s0 = samples[i0 * channels + ch];
            let s1 = samples[i1 * channels + ch];
            out.push(s0 + (s1 - s0) * frac);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s16le_packet(samples: &[i16], layout: ChannelLayout, rate: u32) -> AudioPacket {
        let caps = AudioCaps::new(SampleFormat::S16Le, layout, rate);
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        AudioPacket::new(caps, data)
    }

    #[test]
    fn test_convert_without_output_caps() {
        let converter = AudioConverter::new();
        let packet = s16le_packet(&[0, 1000], ChannelLayout::Mono, 8000);
        assert!(converter.convert(&packet).is_none());
    }

    #[test]
    fn test_passthrough_keeps_bytes() {
        let caps = AudioCaps::new(SampleFormat::F64Le, ChannelLayout::Mono, 8000);
        let mut converter = AudioConverter::new();
        converter.set_output_caps(caps);

        let data: Vec<u8> = [0.25f64, -0.5, 1.0]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let packet = AudioPacket::new(caps, data.clone());
        let converted = converter.convert(&packet).unwrap();
        assert_eq!(converted.data, data);
        assert_eq!(converted.caps, caps);
    }

    #[test]
    fn test_format_conversion_s16_to_f32() {
        let out_caps = AudioCaps::new(SampleFormat::F32Le, ChannelLayout::Mono, 8000);
        let mut converter = AudioConverter::new();
        converter.set_output_caps(out_caps);

        let packet = s16le_packet(&[16384, -16384], ChannelLayout::Mono, 8000);
        let converted = converter.convert(&packet).unwrap();

        let values: Vec<f32> = converted
            .data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert!((values[0] - 0.5).abs() < 0.01);
        assert!((values[1] + 0.5).abs() < 0.01);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let out_caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Mono, 48000);
        let mut converter = AudioConverter::new();
        converter.set_output_caps(out_caps);

        let packet = s16le_packet(&[1000, 3000, -1000, 1000], ChannelLayout::Stereo, 48000);
        let converted = converter.convert(&packet).unwrap();

        let values: Vec<i16> = converted
            .data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(values.len(), 2);
        assert!((values[0] - 2000).abs() <= 1);
        assert!(values[1].abs() <= 1);
    }

    #[test]
    fn test_mono_to_stereo_duplicates() {
        let out_caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Stereo, 8000);
        let mut converter = AudioConverter::new();
        converter.set_output_caps(out_caps);

        let packet = s16le_packet(&[500, -500], ChannelLayout::Mono, 8000);
        let converted = converter.convert(&packet).unwrap();
        assert_eq!(converted.frame_count(), 2);

        let values: Vec<i16> = converted
            .data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(values[0], values[1]);
        assert_eq!(values[2], values[3]);
    }

    #[test]
    fn test_downsample_halves_frames() {
        let out_caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Mono, 8000);
        let mut converter = AudioConverter::new();
        converter.set_output_caps(out_caps);

        let samples: Vec<i16> = (0..1600).map(|i| (i % 100) as i16).collect();
        let packet = s16le_packet(&samples, ChannelLayout::Mono, 16000);
        let converted = converter.convert(&packet).unwrap();
        assert_eq!(converted.frame_count(), 800);
    }

    #[test]
    fn test_rejects_planar_input() {
        let out_caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Mono, 8000);
        let mut converter = AudioConverter::new();
        converter.set_output_caps(out_caps);

        let mut caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Stereo, 8000);
        caps.planar = true;
        let packet = AudioPacket::new(caps, vec![0u8; 32]);
        assert!(converter.convert(&packet).is_none());
    }

    #[test]
    fn test_rejects_empty_packet() {
        let out_caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Mono, 8000);
        let mut converter = AudioConverter::new();
        converter.set_output_caps(out_caps);

        let caps = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Mono, 8000);
        assert!(converter.convert(&AudioPacket::new(caps, Vec::new())).is_none());
    }

    #[test]
    fn test_u8_round_trip() {
        let caps_u8 = AudioCaps::new(SampleFormat::U8, ChannelLayout::Mono, 8000);
        let caps_s16 = AudioCaps::new(SampleFormat::S16Le, ChannelLayout::Mono, 8000);

        let mut to_s16 = AudioConverter::new();
        to_s16.set_output_caps(caps_s16);
        let mut to_u8 = AudioConverter::new();
        to_u8.set_output_caps(caps_u8);

        let original = AudioPacket::new(caps_u8, vec![128, 192, 64, 255, 0]);
        let wide = to_s16.convert(&original).unwrap();
        let back = to_u8.convert(&wide).unwrap();

        for (a, b) in original.data.iter().zip(back.data.iter()) {
            assert!((i16::from(*a) - i16::from(*b)).abs() <= 2);
        }
    }
}
