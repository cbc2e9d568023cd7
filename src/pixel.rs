//! Canonical pixel value.
//!
//! Every decoded pixel is an [`Rgba<f64>`](rgb::Rgba) in R, G, B, A order,
//! whatever its stored format. Integer formats hold the integer widened to
//! `f64`; whether that value is signed or normalized is a property of the
//! [`PixelFormat`], not of the value.

use rgb::Rgba;

use crate::format::PixelFormat;

/// Four `f64` channels in canonical R, G, B, A order.
pub type PixelValue = Rgba<f64>;

/// Channels as an array, canonical order.
#[inline]
pub fn channels(value: &PixelValue) -> [f64; 4] {
    [value.r, value.g, value.b, value.a]
}

/// Build a value from a canonical-order array.
#[inline]
pub fn from_channels(c: [f64; 4]) -> PixelValue {
    Rgba {
        r: c[0],
        g: c[1],
        b: c[2],
        a: c[3],
    }
}

/// The value a read outside the image resolves to.
///
/// All colour channels are zero. Alpha is zero when the format stores alpha
/// and one when it does not, matching the hardware border colour used by
/// clamp addressing.
pub fn border_color(format: PixelFormat) -> PixelValue {
    let alpha = if format.has_alpha() { 0.0 } else { 1.0 };
    from_channels([0.0, 0.0, 0.0, alpha])
}

/// `acc += weight * value`, channel-wise.
#[inline]
pub(crate) fn accumulate(acc: &mut [f64; 4], weight: f64, value: &PixelValue) {
    for (a, c) in acc.iter_mut().zip(channels(value)) {
        *a += weight * c;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelDataType, ChannelOrder};

    #[test]
    fn border_alpha_follows_format() {
        assert_eq!(
            channels(&border_color(PixelFormat::RGBA_UNORM_INT8)),
            [0.0; 4]
        );
        assert_eq!(
            channels(&border_color(PixelFormat::R_FLOAT)),
            [0.0, 0.0, 0.0, 1.0]
        );
        let intensity =
            PixelFormat::new(ChannelOrder::Intensity, ChannelDataType::UnormInt8).unwrap();
        assert_eq!(border_color(intensity).a, 0.0);
        assert_eq!(border_color(PixelFormat::RGB_565).a, 1.0);
    }

    #[test]
    fn channel_array_round_trip() {
        let v = from_channels([0.25, -1.0, 3.5, 1.0]);
        assert_eq!(v.r, 0.25);
        assert_eq!(v.g, -1.0);
        assert_eq!(channels(&v), [0.25, -1.0, 3.5, 1.0]);
    }

    #[test]
    fn accumulate_weights() {
        let mut acc = [0.0; 4];
        accumulate(&mut acc, 0.25, &from_channels([4.0, 8.0, 0.0, 1.0]));
        accumulate(&mut acc, 0.75, &from_channels([0.0, 4.0, 4.0, 1.0]));
        assert_eq!(acc, [1.0, 5.0, 3.0, 1.0]);
    }
}
