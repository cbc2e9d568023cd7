//! Single-pixel codec between stored bytes and [`PixelValue`].
//!
//! All multi-byte channels and packed words use native byte order, the
//! layout a device sees when the host buffer is handed over unchanged.

use rand::Rng;

use crate::format::{ChannelKind, FormatInfo, PixelFormat, Slot};
use crate::half::{HalfRounding, f32_to_half, half_to_f32};
use crate::pixel::{PixelValue, channels, from_channels};

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode one pixel into canonical R, G, B, A order.
///
/// # Panics
///
/// Panics if `bytes` is shorter than `format.bytes_per_pixel()`.
pub fn decode(bytes: &[u8], format: PixelFormat) -> PixelValue {
    let info = format.info();
    assert!(
        bytes.len() >= usize::from(info.bytes_per_pixel),
        "pixel needs {} bytes for {format}, got {}",
        info.bytes_per_pixel,
        bytes.len()
    );

    let slots = format.order().slots();
    let mut stored = [0.0f64; 4];
    match info.packed {
        Some(layout) => {
            let word = read_word(bytes, layout.word_bytes);
            for (dst, field) in stored.iter_mut().zip(layout.fields) {
                *dst = f64::from((word >> field.shift) & field.mask()) / f64::from(field.mask());
            }
        }
        None => {
            let bpc = usize::from(info.bytes_per_channel);
            for (i, dst) in stored.iter_mut().enumerate().take(slots.len()) {
                *dst = read_channel(&bytes[i * bpc..(i + 1) * bpc], info.kind);
            }
        }
    }

    let srgb = format.order().is_srgb();
    let mut out = [0.0, 0.0, 0.0, 1.0];
    for (&slot, &v) in slots.iter().zip(&stored) {
        match slot {
            Slot::R => out[0] = if srgb { srgb_to_linear(v) } else { v },
            Slot::G => out[1] = if srgb { srgb_to_linear(v) } else { v },
            Slot::B => out[2] = if srgb { srgb_to_linear(v) } else { v },
            Slot::A => out[3] = v,
            Slot::Intensity => out = [v; 4],
            Slot::Luminance => {
                out[0] = v;
                out[1] = v;
                out[2] = v;
            }
            Slot::Depth => out[0] = v,
            Slot::Padding => {}
        }
    }
    from_channels(out)
}

fn read_word(bytes: &[u8], word_bytes: u8) -> u32 {
    match word_bytes {
        2 => u32::from(u16::from_ne_bytes([bytes[0], bytes[1]])),
        _ => u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

fn read_channel(b: &[u8], kind: ChannelKind) -> f64 {
    match (kind, b.len()) {
        (ChannelKind::Unorm, 1) => f64::from(b[0]) / 255.0,
        (ChannelKind::Unorm, _) => f64::from(u16::from_ne_bytes([b[0], b[1]])) / 65535.0,
        (ChannelKind::Snorm, 1) => (f64::from(b[0] as i8) / 127.0).max(-1.0),
        (ChannelKind::Snorm, _) => {
            (f64::from(i16::from_ne_bytes([b[0], b[1]])) / 32767.0).max(-1.0)
        }
        (ChannelKind::SignedInt, 1) => f64::from(b[0] as i8),
        (ChannelKind::SignedInt, 2) => f64::from(i16::from_ne_bytes([b[0], b[1]])),
        (ChannelKind::SignedInt, _) => f64::from(i32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
        (ChannelKind::UnsignedInt, 1) => f64::from(b[0]),
        (ChannelKind::UnsignedInt, 2) => f64::from(u16::from_ne_bytes([b[0], b[1]])),
        (ChannelKind::UnsignedInt, _) => f64::from(u32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
        (ChannelKind::Half, _) => f64::from(half_to_f32(u16::from_ne_bytes([b[0], b[1]]))),
        (ChannelKind::Float, _) => f64::from(f32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encode one pixel, narrowing half channels with round-to-nearest-even.
///
/// # Panics
///
/// Panics if `out` is shorter than `format.bytes_per_pixel()`.
pub fn encode(value: &PixelValue, format: PixelFormat, out: &mut [u8]) {
    encode_with(value, format, HalfRounding::NearestEven, out);
}

/// Encode one pixel with an explicit half rounding mode.
///
/// Normalized channels are clamped and scaled with round-to-nearest-even,
/// integer channels are rounded and saturated, padding is written as zero.
///
/// # Panics
///
/// Panics if `out` is shorter than `format.bytes_per_pixel()`.
pub fn encode_with(value: &PixelValue, format: PixelFormat, rounding: HalfRounding, out: &mut [u8]) {
    let info = format.info();
    let bpp = usize::from(info.bytes_per_pixel);
    assert!(
        out.len() >= bpp,
        "pixel needs {bpp} bytes for {format}, got {}",
        out.len()
    );

    let mut c = channels(value);
    if format.order().is_srgb() {
        for v in &mut c[..3] {
            *v = linear_to_srgb(*v);
        }
    }

    let slots = format.order().slots();
    match info.packed {
        Some(layout) => {
            let mut word = 0u32;
            for (&slot, field) in slots.iter().zip(layout.fields) {
                let v = slot_source(slot, &c).unwrap_or(0.0);
                word |= quantize_unorm(v, field.mask()) << field.shift;
            }
            match layout.word_bytes {
                2 => out[..2].copy_from_slice(&(word as u16).to_ne_bytes()),
                _ => out[..4].copy_from_slice(&word.to_ne_bytes()),
            }
        }
        None => {
            let bpc = usize::from(info.bytes_per_channel);
            for (i, &slot) in slots.iter().enumerate() {
                let dst = &mut out[i * bpc..(i + 1) * bpc];
                match slot_source(slot, &c) {
                    Some(v) => write_channel(dst, info.kind, v, rounding),
                    None => dst.fill(0),
                }
            }
        }
    }
}

/// Canonical channel a stored slot is written from. `None` for padding.
fn slot_source(slot: Slot, c: &[f64; 4]) -> Option<f64> {
    match slot {
        Slot::R | Slot::Intensity | Slot::Luminance | Slot::Depth => Some(c[0]),
        Slot::G => Some(c[1]),
        Slot::B => Some(c[2]),
        Slot::A => Some(c[3]),
        Slot::Padding => None,
    }
}

#[inline]
fn quantize_unorm(v: f64, max: u32) -> u32 {
    (v.clamp(0.0, 1.0) * f64::from(max)).round_ties_even() as u32
}

#[inline]
fn quantize_snorm(v: f64, max: i32) -> i32 {
    (v.clamp(-1.0, 1.0) * f64::from(max)).round_ties_even() as i32
}

fn write_channel(dst: &mut [u8], kind: ChannelKind, v: f64, rounding: HalfRounding) {
    // Float-to-int `as` casts saturate and map NaN to zero.
    match (kind, dst.len()) {
        (ChannelKind::Unorm, 1) => dst[0] = quantize_unorm(v, 255) as u8,
        (ChannelKind::Unorm, _) => {
            dst.copy_from_slice(&(quantize_unorm(v, 65535) as u16).to_ne_bytes())
        }
        (ChannelKind::Snorm, 1) => dst[0] = quantize_snorm(v, 127) as i8 as u8,
        (ChannelKind::Snorm, _) => {
            dst.copy_from_slice(&(quantize_snorm(v, 32767) as i16).to_ne_bytes())
        }
        (ChannelKind::SignedInt, 1) => dst[0] = v.round_ties_even() as i8 as u8,
        (ChannelKind::SignedInt, 2) => {
            dst.copy_from_slice(&(v.round_ties_even() as i16).to_ne_bytes())
        }
        (ChannelKind::SignedInt, _) => {
            dst.copy_from_slice(&(v.round_ties_even() as i32).to_ne_bytes())
        }
        (ChannelKind::UnsignedInt, 1) => dst[0] = v.round_ties_even() as u8,
        (ChannelKind::UnsignedInt, 2) => {
            dst.copy_from_slice(&(v.round_ties_even() as u16).to_ne_bytes())
        }
        (ChannelKind::UnsignedInt, _) => {
            dst.copy_from_slice(&(v.round_ties_even() as u32).to_ne_bytes())
        }
        (ChannelKind::Half, _) => {
            dst.copy_from_slice(&f32_to_half(narrow_round_to_odd(v), rounding).to_ne_bytes())
        }
        (ChannelKind::Float, _) => dst.copy_from_slice(&(v as f32).to_ne_bytes()),
    }
}

/// Narrow `f64` to `f32` with round-to-odd.
///
/// Rounding the result again to half precision, in either mode, then gives
/// the same answer as rounding the `f64` directly.
fn narrow_round_to_odd(v: f64) -> f32 {
    if !v.is_finite() {
        return v as f32;
    }
    let nearest = v as f32;
    let truncated = if f64::from(nearest).abs() > v.abs() {
        f32::from_bits(nearest.to_bits() - 1)
    } else {
        nearest
    };
    if f64::from(truncated) == v {
        truncated
    } else {
        f32::from_bits(truncated.to_bits() | 1)
    }
}

/// Bring a reference value down to what the format can store, rounding
/// half channels to nearest even.
///
/// Used at comparison time: the reference is computed in `f64` and only
/// narrowed once, right before it is diffed against device output.
pub fn narrow(value: &PixelValue, format: PixelFormat) -> PixelValue {
    narrow_with(value, format, HalfRounding::NearestEven)
}

/// [`narrow`] with the half rounding mode of the device under test.
pub fn narrow_with(value: &PixelValue, format: PixelFormat, rounding: HalfRounding) -> PixelValue {
    let mut buf = [0u8; 16];
    encode_with(value, format, rounding, &mut buf);
    decode(&buf, format)
}

// ---------------------------------------------------------------------------
// sRGB transfer
// ---------------------------------------------------------------------------

fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(l: f64) -> f64 {
    if l.is_nan() {
        0.0
    } else if l <= 0.003_130_8 {
        l * 12.92
    } else {
        1.055 * l.powf(1.0 / 2.4) - 0.055
    }
}

// ---------------------------------------------------------------------------
// Random generation
// ---------------------------------------------------------------------------

/// Fill `out` with random stored bytes for one pixel.
///
/// The result is canonical: padding bits are zero, float channels are
/// finite, and signed normalized channels never use the most negative
/// code (which decodes to the same value as its neighbour). Such bytes
/// survive `encode(decode(bytes))` unchanged.
///
/// # Panics
///
/// Panics if `out` is shorter than `format.bytes_per_pixel()`.
pub fn random_pixel_bytes<R: Rng + ?Sized>(format: PixelFormat, rng: &mut R, out: &mut [u8]) {
    let info = format.info();
    let bpp = usize::from(info.bytes_per_pixel);
    let out = &mut out[..bpp];
    rng.fill(out);

    match info.packed {
        Some(layout) => {
            let used = layout
                .fields
                .iter()
                .fold(0u32, |acc, f| acc | (f.mask() << f.shift));
            let word = read_word(out, layout.word_bytes) & used;
            match layout.word_bytes {
                2 => out.copy_from_slice(&(word as u16).to_ne_bytes()),
                _ => out.copy_from_slice(&word.to_ne_bytes()),
            }
        }
        None => canonicalize_channels(format, info, out),
    }
}

fn canonicalize_channels(format: PixelFormat, info: FormatInfo, out: &mut [u8]) {
    let bpc = usize::from(info.bytes_per_channel);
    for (i, &slot) in format.order().slots().iter().enumerate() {
        let ch = &mut out[i * bpc..(i + 1) * bpc];
        if slot == Slot::Padding {
            ch.fill(0);
            continue;
        }
        match (info.kind, bpc) {
            (ChannelKind::Snorm, 1) => {
                if ch[0] == 0x80 {
                    ch[0] = 0x81;
                }
            }
            (ChannelKind::Snorm, _) => {
                if i16::from_ne_bytes([ch[0], ch[1]]) == i16::MIN {
                    ch.copy_from_slice(&(i16::MIN + 1).to_ne_bytes());
                }
            }
            (ChannelKind::Half, _) => {
                let bits = u16::from_ne_bytes([ch[0], ch[1]]);
                if bits & 0x7c00 == 0x7c00 {
                    ch.copy_from_slice(&(bits & !0x4000).to_ne_bytes());
                }
            }
            (ChannelKind::Float, _) => {
                let bits = u32::from_ne_bytes([ch[0], ch[1], ch[2], ch[3]]);
                if bits & 0x7f80_0000 == 0x7f80_0000 {
                    ch.copy_from_slice(&(bits & !0x4000_0000).to_ne_bytes());
                }
            }
            _ => {}
        }
    }
}

/// A random pixel that the format can represent exactly.
pub fn random_pixel<R: Rng + ?Sized>(format: PixelFormat, rng: &mut R) -> PixelValue {
    let mut buf = [0u8; 16];
    random_pixel_bytes(format, rng, &mut buf);
    decode(&buf, format)
}
