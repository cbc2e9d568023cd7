//! Comparison of device results against reference values.
//!
//! A mismatch is data, not a failure of this crate: [`check_pixel`] returns
//! it, [`VerifyReport`] collects it, and the caller decides what a failed
//! test looks like.

use core::fmt;

use tracing::warn;

use crate::image::ImageMemory;
use crate::pixel::{PixelValue, channels};

const CHANNEL_NAMES: [char; 4] = ['r', 'g', 'b', 'a'];

/// Allowed deviation per channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tolerance {
    /// Values must be equal. NaN matches NaN.
    Exact,
    /// `|actual - expected| <= bound`.
    Absolute(f64),
    /// Error measured in `f32` ULPs at the expected value, see [`ulp_error`].
    Ulps(f64),
}

impl Tolerance {
    /// Error of `actual` against `expected` in this tolerance's unit.
    pub fn error(self, expected: f64, actual: f64) -> f64 {
        if expected.is_nan() && actual.is_nan() {
            return 0.0;
        }
        match self {
            Self::Exact | Self::Absolute(_) => {
                if expected == actual {
                    0.0
                } else {
                    let diff = (actual - expected).abs();
                    if diff.is_nan() { f64::INFINITY } else { diff }
                }
            }
            Self::Ulps(_) => ulp_error(actual as f32, expected).abs(),
        }
    }

    /// Whether an error from [`error`](Self::error) is within bounds.
    pub fn allows(self, error: f64) -> bool {
        match self {
            Self::Exact => error == 0.0,
            Self::Absolute(bound) | Self::Ulps(bound) => error <= bound,
        }
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => f.write_str("exact"),
            Self::Absolute(bound) => write!(f, "±{bound}"),
            Self::Ulps(ulps) => write!(f, "{ulps} ulp"),
        }
    }
}

/// Signed error of `actual` in units of the `f32` ULP at `expected`.
///
/// The ULP is `2^(e - 23)` where `e` is the binary exponent of `expected`,
/// floored at the smallest normal exponent so subnormal results are
/// measured on the subnormal grid. Infinite or NaN expectations are matched
/// exactly (error 0) or not at all (infinite error).
pub fn ulp_error(actual: f32, expected: f64) -> f64 {
    let actual = f64::from(actual);
    if expected.is_nan() {
        return if actual.is_nan() { 0.0 } else { f64::INFINITY };
    }
    if expected.is_infinite() {
        return if actual == expected { 0.0 } else { f64::INFINITY };
    }
    if actual.is_nan() {
        return f64::INFINITY;
    }

    let biased = ((expected.to_bits() >> 52) & 0x7ff) as i32;
    let exponent = if biased == 0 {
        f32::MIN_EXP - 1
    } else {
        (biased - 1023).max(f32::MIN_EXP - 1)
    };
    let ulp = 2f64.powi(exponent - (f32::MANTISSA_DIGITS as i32 - 1));
    (actual - expected) / ulp
}

// ---------------------------------------------------------------------------
// Mismatch
// ---------------------------------------------------------------------------

/// One pixel outside tolerance, with enough context to diagnose it.
#[derive(Clone, Debug, PartialEq)]
pub struct Mismatch {
    pub coord: [i64; 3],
    /// First failing channel, canonical order (0 = R).
    pub channel: usize,
    pub expected: PixelValue,
    pub actual: PixelValue,
    pub error: f64,
    pub tolerance: Tolerance,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.coord;
        write!(
            f,
            "pixel ({x}, {y}, {z}) channel {}: expected {:?}, got {:?} (error {} exceeds {})",
            CHANNEL_NAMES[self.channel],
            channels(&self.expected),
            channels(&self.actual),
            self.error,
            self.tolerance,
        )
    }
}

impl core::error::Error for Mismatch {}

/// Compare two pixels channel by channel.
///
/// # Errors
///
/// Returns the first channel outside `tolerance` as a [`Mismatch`].
pub fn check_pixel(
    coord: [i64; 3],
    expected: &PixelValue,
    actual: &PixelValue,
    tolerance: Tolerance,
) -> Result<(), Mismatch> {
    let e = channels(expected);
    let a = channels(actual);
    for channel in 0..4 {
        let error = tolerance.error(e[channel], a[channel]);
        if !tolerance.allows(error) {
            return Err(Mismatch {
                coord,
                channel,
                expected: *expected,
                actual: *actual,
                error,
                tolerance,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// VerifyReport
// ---------------------------------------------------------------------------

/// Running tally of checks for one test.
#[derive(Clone, Debug, Default)]
pub struct VerifyReport {
    checked: usize,
    failures: Vec<Mismatch>,
}

impl VerifyReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one check, keeping and logging it if it failed.
    pub fn record(&mut self, result: Result<(), Mismatch>) {
        self.checked += 1;
        if let Err(mismatch) = result {
            warn!(%mismatch, "verification mismatch");
            self.failures.push(mismatch);
        }
    }

    /// [`check_pixel`] and [`record`](Self::record) in one step.
    pub fn check(
        &mut self,
        coord: [i64; 3],
        expected: &PixelValue,
        actual: &PixelValue,
        tolerance: Tolerance,
    ) -> bool {
        let result = check_pixel(coord, expected, actual, tolerance);
        let ok = result.is_ok();
        self.record(result);
        ok
    }

    /// Compare every pixel of two images of the same extent.
    ///
    /// # Panics
    ///
    /// Panics if the extents differ.
    pub fn check_images(
        &mut self,
        expected: &ImageMemory,
        actual: &ImageMemory,
        tolerance: Tolerance,
    ) {
        let extent = expected.descriptor().extent();
        assert_eq!(
            extent,
            actual.descriptor().extent(),
            "image extents differ"
        );
        let [w, h, d] = extent.map(|n| n as i64);
        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    self.check(
                        [x, y, z],
                        &expected.read_pixel(x, y, z),
                        &actual.read_pixel(x, y, z),
                        tolerance,
                    );
                }
            }
        }
    }

    #[inline]
    pub fn checked(&self) -> usize {
        self.checked
    }

    #[inline]
    pub fn failures(&self) -> &[Mismatch] {
        &self.failures
    }

    #[inline]
    pub fn is_pass(&self) -> bool {
        self.failures.is_empty()
    }
}
