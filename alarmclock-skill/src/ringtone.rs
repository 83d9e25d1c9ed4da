//! Ringtone audio.
//!
//! The audio server plays whatever WAV bytes it is sent, so volume is baked
//! into the bytes once per site at startup. Only 16-bit PCM is adjusted;
//! other encodings are sent as they are.

use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::tracing::prelude::*;

const BEEP_SAMPLE_RATE: u32 = 16_000;
const BEEP_FREQUENCY_HZ: f32 = 880.0;
const BEEP_AMPLITUDE: f32 = 0.8;

/// Read a WAV file from disk, or synthesize the default beep.
pub fn load(path: Option<&Path>) -> Result<Bytes> {
    match path {
        Some(path) => std::fs::read(path).map(Bytes::from).map_err(|e| {
            Error::Config(format!("cannot read ringtone {}: {e}", path.display()))
        }),
        None => Ok(beep()),
    }
}

/// One second of mono 16-bit PCM: two short 880 Hz bursts.
pub fn beep() -> Bytes {
    let total = BEEP_SAMPLE_RATE as usize;
    let burst = total / 4;
    let mut samples = Vec::with_capacity(total);
    for n in 0..total {
        let audible = (n / burst) % 2 == 0;
        let sample = if audible {
            let t = n as f32 / BEEP_SAMPLE_RATE as f32;
            (t * BEEP_FREQUENCY_HZ * std::f32::consts::TAU).sin() * BEEP_AMPLITUDE
        } else {
            0.0
        };
        samples.push((sample * i16::MAX as f32) as i16);
    }
    encode_pcm16(BEEP_SAMPLE_RATE, 1, &samples)
}

/// Attenuation in dB for a 0--100 volume setting.
///
/// 100 plays at full scale; 0 is 48 dB down.
pub fn attenuation_db(volume: u8) -> f32 {
    let volume = f32::from(volume.min(100));
    (100.0 - (volume * 0.8 + 20.0)) * 0.6
}

/// Normalize to full scale, then attenuate for `volume`.
///
/// Returns the input unchanged if it is not 16-bit PCM WAV.
pub fn apply_volume(wav: &Bytes, volume: u8) -> Bytes {
    let Some(layout) = WavLayout::parse(wav) else {
        warn!("Ringtone is not 16-bit PCM WAV, volume left unchanged");
        return wav.clone();
    };

    let data = &wav[layout.data.clone()];
    let peak = data
        .chunks_exact(2)
        .map(|s| i16::from_le_bytes([s[0], s[1]]).unsigned_abs())
        .max()
        .unwrap_or(0);
    if peak == 0 {
        return wav.clone();
    }

    let normalize = f32::from(i16::MAX) / f32::from(peak);
    let attenuate = 10f32.powf(-attenuation_db(volume) / 20.0);
    let gain = normalize * attenuate;
    debug!(volume, peak, gain, "Applying ringtone volume");

    let mut out = BytesMut::from(&wav[..]);
    for (dst, src) in out[layout.data.clone()]
        .chunks_exact_mut(2)
        .zip(data.chunks_exact(2))
    {
        let sample = f32::from(i16::from_le_bytes([src[0], src[1]])) * gain;
        let scaled = sample.round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
        dst.copy_from_slice(&scaled.to_le_bytes());
    }
    out.freeze()
}

/// Location of the sample data in a 16-bit PCM WAV file.
struct WavLayout {
    data: std::ops::Range<usize>,
}

impl WavLayout {
    fn parse(wav: &[u8]) -> Option<Self> {
        if wav.len() < 12 || &wav[0..4] != b"RIFF" || &wav[8..12] != b"WAVE" {
            return None;
        }

        let mut pcm16 = false;
        let mut offset = 12;
        while offset + 8 <= wav.len() {
            let id = &wav[offset..offset + 4];
            let mut size_bytes = &wav[offset + 4..offset + 8];
            let size = size_bytes.get_u32_le() as usize;
            let body = offset + 8;
            let end = body.checked_add(size)?.min(wav.len());

            match id {
                b"fmt " => {
                    let mut fmt = wav.get(body..end)?;
                    if fmt.len() < 16 {
                        return None;
                    }
                    let format = fmt.get_u16_le();
                    fmt.advance(12);
                    let bits = fmt.get_u16_le();
                    pcm16 = format == 1 && bits == 16;
                }
                b"data" => {
                    return pcm16.then_some(WavLayout {
                        data: body..body + (end - body) / 2 * 2,
                    });
                }
                _ => {}
            }

            // Chunks are padded to even length.
            offset = body + size + (size & 1);
        }
        None
    }
}

fn encode_pcm16(sample_rate: u32, channels: u16, samples: &[i16]) -> Bytes {
    let data_len = (samples.len() * 2) as u32;
    let block_align = channels * 2;
    let mut buf = BytesMut::with_capacity(44 + data_len as usize);

    buf.put_slice(b"RIFF");
    buf.put_u32_le(36 + data_len);
    buf.put_slice(b"WAVE");

    buf.put_slice(b"fmt ");
    buf.put_u32_le(16);
    buf.put_u16_le(1);
    buf.put_u16_le(channels);
    buf.put_u32_le(sample_rate);
    buf.put_u32_le(sample_rate * u32::from(block_align));
    buf.put_u16_le(block_align);
    buf.put_u16_le(16);

    buf.put_slice(b"data");
    buf.put_u32_le(data_len);
    for sample in samples {
        buf.put_i16_le(*sample);
    }
    buf.freeze()
}
