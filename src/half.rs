//! IEEE 754 binary16 conversion.
//!
//! The rounding mode is always an argument. Devices report either
//! round-to-nearest-even or round-toward-zero for half stores, and the
//! reference has to match whichever one is under test.

/// Rounding used when narrowing `f32` to half.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HalfRounding {
    /// Round to nearest, ties to even. Overflow goes to infinity.
    #[default]
    NearestEven,
    /// Truncate toward zero. Overflow saturates to the largest finite half.
    TowardZero,
}

const HALF_INFINITY: u16 = 0x7c00;
const HALF_MAX_FINITE: u16 = 0x7bff;
const HALF_QUIET_BIT: u16 = 0x0200;

/// Widen a half bit pattern to `f32`. Exact for every input.
///
/// NaN payload bits move into the top of the `f32` mantissa.
pub fn half_to_f32(bits: u16) -> f32 {
    let sign = u32::from(bits & 0x8000) << 16;
    let exp = u32::from((bits >> 10) & 0x1f);
    let mant = u32::from(bits & 0x3ff);

    match exp {
        0x1f => f32::from_bits(sign | 0x7f80_0000 | (mant << 13)),
        0 => {
            // Subnormal or zero: mant * 2^-24 is exact in f32.
            let magnitude = mant as f32 * (1.0 / 16_777_216.0);
            if sign != 0 { -magnitude } else { magnitude }
        }
        _ => f32::from_bits(sign | ((exp + 112) << 23) | (mant << 13)),
    }
}

/// Narrow an `f32` to a half bit pattern with the given rounding.
pub fn f32_to_half(value: f32, rounding: HalfRounding) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let mant = bits & 0x7f_ffff;

    if exp == 0xff {
        if mant == 0 {
            return sign | HALF_INFINITY;
        }
        let payload = (mant >> 13) as u16;
        return sign
            | HALF_INFINITY
            | if payload == 0 { HALF_QUIET_BIT } else { payload };
    }
    // f32 zero and subnormals are far below the smallest half subnormal.
    if exp == 0 {
        return sign;
    }

    let unbiased = exp - 127;
    if unbiased > 15 {
        return sign
            | match rounding {
                HalfRounding::NearestEven => HALF_INFINITY,
                HalfRounding::TowardZero => HALF_MAX_FINITE,
            };
    }

    let significand = mant | 0x80_0000;
    let (base, shift) = if unbiased >= -14 {
        (((unbiased + 15) as u32) << 10, 13u32)
    } else {
        (0, (13 - 14 - unbiased) as u32)
    };
    if shift > 31 {
        return sign;
    }

    // For normals the implicit bit is dropped by the mask; for subnormals it
    // is part of the shifted value. Adding to `base` lets a rounding carry
    // roll into the exponent.
    let kept = if shift == 13 {
        (significand >> shift) & 0x3ff
    } else {
        significand >> shift
    };
    let mut result = base + kept;

    if rounding == HalfRounding::NearestEven {
        let rem = significand & ((1u32 << shift) - 1);
        let halfway = 1u32 << (shift - 1);
        if rem > halfway || (rem == halfway && result & 1 == 1) {
            result += 1;
        }
    }
    sign | result as u16
}
