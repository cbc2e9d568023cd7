//! Reference image sampler.
//!
//! [`ReferenceSampler`] computes what a conformant hardware sampler returns
//! for a floating-point coordinate. Every call is a pure function of the
//! image, the coordinate and the [`SamplerConfig`]. All arithmetic is `f64`;
//! narrow the result with [`narrow`](crate::codec::narrow) at comparison
//! time if the device result is in the image's precision.

use crate::format::PixelFormat;
use crate::image::ImageMemory;
use crate::pixel::{PixelValue, accumulate, from_channels};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How coordinates outside the image resolve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    /// No resolution; out-of-range fetches read the border colour.
    None,
    /// Clamp to the edge pixels.
    ClampToEdge,
    /// Clamp one pixel past each edge, where the border colour lives.
    Clamp,
    /// Wrap around. Normalized coordinates only.
    Repeat,
    /// Reflect at every edge. Normalized coordinates only.
    MirroredRepeat,
}

impl AddressingMode {
    /// Every addressing mode, in declaration order.
    pub const ALL: [AddressingMode; 5] = [
        Self::None,
        Self::ClampToEdge,
        Self::Clamp,
        Self::Repeat,
        Self::MirroredRepeat,
    ];

    /// Whether the mode is only defined for normalized coordinates.
    pub const fn requires_normalized(self) -> bool {
        matches!(self, Self::Repeat | Self::MirroredRepeat)
    }
}

/// Filter applied between pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Errors from sampler construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SamplerError {
    #[error("{addressing:?} addressing requires normalized coordinates")]
    RepeatRequiresNormalized { addressing: AddressingMode },
    #[error("linear filtering is undefined for integer format {format}")]
    LinearOnIntegerFormat { format: PixelFormat },
}

/// Sampler state: addressing, filter and coordinate normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerConfig {
    normalized_coords: bool,
    addressing: AddressingMode,
    filter: FilterMode,
}

impl SamplerConfig {
    /// # Errors
    ///
    /// Returns [`SamplerError::RepeatRequiresNormalized`] for repeat or
    /// mirrored-repeat addressing without normalized coordinates.
    pub const fn new(
        normalized_coords: bool,
        addressing: AddressingMode,
        filter: FilterMode,
    ) -> Result<Self, SamplerError> {
        if addressing.requires_normalized() && !normalized_coords {
            return Err(SamplerError::RepeatRequiresNormalized { addressing });
        }
        Ok(Self {
            normalized_coords,
            addressing,
            filter,
        })
    }

    /// Every legal configuration.
    pub fn all() -> impl Iterator<Item = SamplerConfig> {
        [false, true].into_iter().flat_map(|normalized| {
            AddressingMode::ALL.into_iter().flat_map(move |addressing| {
                [FilterMode::Nearest, FilterMode::Linear]
                    .into_iter()
                    .filter_map(move |filter| Self::new(normalized, addressing, filter).ok())
            })
        })
    }

    /// Whether coordinates are scaled by the image extent before use.
    #[inline]
    pub const fn normalized_coords(self) -> bool {
        self.normalized_coords
    }

    #[inline]
    pub const fn addressing(self) -> AddressingMode {
        self.addressing
    }

    #[inline]
    pub const fn filter(self) -> FilterMode {
        self.filter
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// One fetched pixel and its contribution to a sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tap {
    /// Logical coordinate read, after addressing. May lie outside the
    /// image, in which case `value` is the border colour.
    pub coord: [i64; 3],
    pub weight: f64,
    pub value: PixelValue,
}

/// Up to two pixel indices along one axis with their weights.
#[derive(Clone, Copy, Debug)]
struct AxisTaps {
    index: [i64; 2],
    weight: [f64; 2],
    len: usize,
}

impl AxisTaps {
    fn single(index: i64) -> Self {
        Self {
            index: [index, index],
            weight: [1.0, 0.0],
            len: 1,
        }
    }

    /// `i0` weighted `1 - a`, `i1` weighted `a`.
    fn pair(i0: i64, i1: i64, a: f64) -> Self {
        Self {
            index: [i0, i1],
            weight: [1.0 - a, a],
            len: 2,
        }
    }
}

#[inline]
fn floor_index(u: f64) -> i64 {
    // Saturating cast; NaN lands on 0.
    u.floor() as i64
}

#[inline]
fn frac(u: f64) -> f64 {
    // Infinite coordinates put all weight on the first (saturated) index.
    if u.is_finite() { u - u.floor() } else { 0.0 }
}

/// Array layers round to the nearest layer, ties to even, and clamp.
fn layer_index(c: f64, layers: usize) -> i64 {
    floor_index(c.round_ties_even()).clamp(0, layers as i64 - 1)
}

/// Samples an [`ImageMemory`] the way a conformant device does.
#[derive(Clone, Copy, Debug)]
pub struct ReferenceSampler<'a> {
    image: &'a ImageMemory,
    config: SamplerConfig,
}

impl<'a> ReferenceSampler<'a> {
    /// # Errors
    ///
    /// Returns [`SamplerError::LinearOnIntegerFormat`] when linear
    /// filtering is requested for an unnormalized integer format.
    pub fn new(image: &'a ImageMemory, config: SamplerConfig) -> Result<Self, SamplerError> {
        let format = image.format();
        if config.filter == FilterMode::Linear && format.is_integer() {
            return Err(SamplerError::LinearOnIntegerFormat { format });
        }
        Ok(Self { image, config })
    }

    /// Configuration this sampler applies.
    #[inline]
    pub fn config(&self) -> SamplerConfig {
        self.config
    }

    /// Image being sampled.
    #[inline]
    pub fn image(&self) -> &'a ImageMemory {
        self.image
    }

    /// Sample at `coord`. Unused axes are ignored.
    pub fn sample(&self, coord: [f64; 3]) -> PixelValue {
        blend(&self.taps(coord))
    }

    /// Sample and report every pixel fetched, for diagnosing mismatches.
    pub fn sample_traced(&self, coord: [f64; 3]) -> (PixelValue, Vec<Tap>) {
        let taps = self.taps(coord);
        (blend(&taps), taps)
    }

    /// Tensor product of the per-axis taps.
    fn taps(&self, coord: [f64; 3]) -> Vec<Tap> {
        let desc = self.image.descriptor();
        let dim = desc.dimensionality();
        let extent = desc.extent();
        let layer_axis = dim.layer_axis();

        let axes: [AxisTaps; 3] = core::array::from_fn(|axis| {
            if layer_axis == Some(axis) {
                AxisTaps::single(layer_index(coord[axis], extent[axis]))
            } else if axis < dim.filtered_axes() {
                self.address(coord[axis], extent[axis])
            } else {
                AxisTaps::single(0)
            }
        });

        let mut taps = Vec::with_capacity(axes.iter().map(|a| a.len).product());
        for k in 0..axes[2].len {
            for j in 0..axes[1].len {
                for i in 0..axes[0].len {
                    let c = [axes[0].index[i], axes[1].index[j], axes[2].index[k]];
                    taps.push(Tap {
                        coord: c,
                        weight: axes[0].weight[i] * axes[1].weight[j] * axes[2].weight[k],
                        value: self.image.read_pixel(c[0], c[1], c[2]),
                    });
                }
            }
        }
        taps
    }

    /// Resolve one filtered axis of extent `n`.
    fn address(&self, s: f64, n: usize) -> AxisTaps {
        let last = n as i64 - 1;
        let size = n as f64;
        let linear = self.config.filter == FilterMode::Linear;

        match self.config.addressing {
            AddressingMode::Repeat => {
                let u = (s - s.floor()) * size;
                if linear {
                    let t = u - 0.5;
                    let mut i0 = floor_index(t);
                    let mut i1 = i0 + 1;
                    if i0 < 0 {
                        i0 += n as i64;
                    }
                    if i1 > last {
                        i1 -= n as i64;
                    }
                    AxisTaps::pair(i0, i1, frac(t))
                } else {
                    let i = floor_index(u);
                    AxisTaps::single(if i > last { i - n as i64 } else { i })
                }
            }
            AddressingMode::MirroredRepeat => {
                let u = (s - 2.0 * (s / 2.0).round_ties_even()).abs() * size;
                if linear {
                    let t = u - 0.5;
                    let i0 = floor_index(t);
                    AxisTaps::pair(i0.max(0), (i0 + 1).min(last), frac(t))
                } else {
                    AxisTaps::single(floor_index(u).min(last))
                }
            }
            mode => {
                let u = if self.config.normalized_coords {
                    s * size
                } else {
                    s
                };
                let (lo, hi) = match mode {
                    AddressingMode::ClampToEdge => (0, last),
                    AddressingMode::Clamp => (-1, last + 1),
                    _ => (i64::MIN, i64::MAX),
                };
                if linear {
                    let t = u - 0.5;
                    let i0 = floor_index(t);
                    AxisTaps::pair(
                        i0.clamp(lo, hi),
                        i0.saturating_add(1).clamp(lo, hi),
                        frac(t),
                    )
                } else {
                    AxisTaps::single(floor_index(u).clamp(lo, hi))
                }
            }
        }
    }
}

fn blend(taps: &[Tap]) -> PixelValue {
    if let [only] = taps {
        return only.value;
    }
    let mut acc = [0.0; 4];
    for tap in taps {
        accumulate(&mut acc, tap.weight, &tap.value);
    }
    from_channels(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageDescriptor;
    use crate::pixel::channels;

    fn config(normalized: bool, addressing: AddressingMode, filter: FilterMode) -> SamplerConfig {
        SamplerConfig::new(normalized, addressing, filter).unwrap()
    }

    /// 1D R/FLOAT image holding 10, 20, 30, 40.
    fn ramp() -> ImageMemory {
        let desc = ImageDescriptor::image_1d(4, PixelFormat::R_FLOAT).unwrap();
        let mut image = ImageMemory::new(desc);
        image.fill_with(|x, _, _| from_channels([(x as f64 + 1.0) * 10.0, 0.0, 0.0, 1.0]));
        image
    }

    fn red(image: &ImageMemory, cfg: SamplerConfig, s: f64) -> f64 {
        ReferenceSampler::new(image, cfg).unwrap().sample([s, 0.0, 0.0]).r
    }

    #[test]
    fn clamp_to_edge() {
        let image = ramp();
        let nearest = config(false, AddressingMode::ClampToEdge, FilterMode::Nearest);
        assert_eq!(red(&image, nearest, -3.0), 10.0);
        assert_eq!(red(&image, nearest, 2.99), 30.0);
        assert_eq!(red(&image, nearest, 7.5), 40.0);

        let linear = config(false, AddressingMode::ClampToEdge, FilterMode::Linear);
        assert_eq!(red(&image, linear, 1.0), 15.0);
        // Both neighbours clamp to pixel 0; weights still sum to one.
        assert_eq!(red(&image, linear, 0.25), 10.0);
        assert_eq!(red(&image, linear, 4.0), 40.0);
    }

    #[test]
    fn clamp_reaches_border() {
        let image = ramp();
        let nearest = config(false, AddressingMode::Clamp, FilterMode::Nearest);
        let sampler = ReferenceSampler::new(&image, nearest).unwrap();
        assert_eq!(channels(&sampler.sample([-0.5, 0.0, 0.0])), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(channels(&sampler.sample([4.0, 0.0, 0.0])), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(sampler.sample([-100.0, 0.0, 0.0]).r, 0.0);

        let linear = config(false, AddressingMode::Clamp, FilterMode::Linear);
        let sampler = ReferenceSampler::new(&image, linear).unwrap();
        let (value, taps) = sampler.sample_traced([0.25, 0.0, 0.0]);
        assert_eq!(taps[0].coord, [-1, 0, 0]);
        assert_eq!(taps[1].coord, [0, 0, 0]);
        assert_eq!(value.r, 7.5);
        assert_eq!(value.a, 1.0);
    }

    #[test]
    fn infinite_coordinates_resolve_without_nan() {
        let image = ramp();
        let border = [0.0, 0.0, 0.0, 1.0];
        for addressing in [AddressingMode::Clamp, AddressingMode::None] {
            let linear = config(false, addressing, FilterMode::Linear);
            let sampler = ReferenceSampler::new(&image, linear).unwrap();
            for s in [f64::NEG_INFINITY, f64::INFINITY] {
                assert_eq!(channels(&sampler.sample([s, 0.0, 0.0])), border, "{addressing:?} {s}");
            }
        }

        let edge = config(false, AddressingMode::ClampToEdge, FilterMode::Linear);
        assert_eq!(red(&image, edge, f64::NEG_INFINITY), 10.0);
        assert_eq!(red(&image, edge, f64::INFINITY), 40.0);

        for addressing in [AddressingMode::Repeat, AddressingMode::MirroredRepeat] {
            let linear = config(true, addressing, FilterMode::Linear);
            assert!(!red(&image, linear, f64::INFINITY).is_nan(), "{addressing:?}");
        }
    }

    #[test]
    fn none_reads_border_outside() {
        let image = ramp();
        let nearest = config(true, AddressingMode::None, FilterMode::Nearest);
        assert_eq!(red(&image, nearest, 0.999), 40.0);
        assert_eq!(red(&image, nearest, 1.0), 0.0);
        assert_eq!(red(&image, nearest, -0.01), 0.0);
    }

    #[test]
    fn repeat() {
        let image = ramp();
        let nearest = config(true, AddressingMode::Repeat, FilterMode::Nearest);
        assert_eq!(red(&image, nearest, 0.125), 10.0);
        assert_eq!(red(&image, nearest, 1.125), 10.0);
        assert_eq!(red(&image, nearest, -0.125), 40.0);

        let linear = config(true, AddressingMode::Repeat, FilterMode::Linear);
        let sampler = ReferenceSampler::new(&image, linear).unwrap();
        let (value, taps) = sampler.sample_traced([0.0, 0.0, 0.0]);
        assert_eq!(taps[0].coord[0], 3);
        assert_eq!(taps[1].coord[0], 0);
        assert_eq!(value.r, 25.0);
    }

    #[test]
    fn mirrored_repeat() {
        let image = ramp();
        let nearest = config(true, AddressingMode::MirroredRepeat, FilterMode::Nearest);
        assert_eq!(red(&image, nearest, 0.125), 10.0);
        assert_eq!(red(&image, nearest, -0.125), 10.0);
        assert_eq!(red(&image, nearest, 1.125), 40.0);
        assert_eq!(red(&image, nearest, 1.0), 40.0);

        let linear = config(true, AddressingMode::MirroredRepeat, FilterMode::Linear);
        assert_eq!(red(&image, linear, 0.25), 15.0);
        assert_eq!(red(&image, linear, 1.75), 15.0);
        assert_eq!(red(&image, linear, 0.0), 10.0);
        assert_eq!(red(&image, linear, 0.375), 20.0);
    }

    #[test]
    fn bilinear_center() {
        let desc = ImageDescriptor::image_2d(2, 2, PixelFormat::R_FLOAT).unwrap();
        let mut image = ImageMemory::new(desc);
        image.fill_with(|x, y, _| from_channels([(1 + x + 2 * y) as f64, 0.0, 0.0, 1.0]));
        let linear = config(false, AddressingMode::ClampToEdge, FilterMode::Linear);
        let sampler = ReferenceSampler::new(&image, linear).unwrap();
        let (value, taps) = sampler.sample_traced([1.0, 1.0, 0.0]);
        assert_eq!(taps.len(), 4);
        assert!(taps.iter().all(|t| t.weight == 0.25));
        assert_eq!(value.r, 2.5);
    }

    #[test]
    fn trilinear_center() {
        let desc = ImageDescriptor::image_3d(2, 2, 2, PixelFormat::R_FLOAT).unwrap();
        let mut image = ImageMemory::new(desc);
        image.fill_with(|x, y, z| from_channels([(x + 2 * y + 4 * z) as f64, 0.0, 0.0, 1.0]));
        let linear = config(true, AddressingMode::ClampToEdge, FilterMode::Linear);
        let sampler = ReferenceSampler::new(&image, linear).unwrap();
        let (value, taps) = sampler.sample_traced([0.5, 0.5, 0.5]);
        assert_eq!(taps.len(), 8);
        assert_eq!(value.r, 3.5);
        assert_eq!(value.a, 1.0);
    }

    #[test]
    fn array_layer_is_rounded_not_filtered() {
        let desc = ImageDescriptor::image_2d_array(2, 2, 3, PixelFormat::R_FLOAT).unwrap();
        let mut image = ImageMemory::new(desc);
        image.fill_with(|x, _, z| from_channels([(z * 10 + x) as f64, 0.0, 0.0, 1.0]));
        let linear = config(true, AddressingMode::ClampToEdge, FilterMode::Linear);
        let sampler = ReferenceSampler::new(&image, linear).unwrap();
        for (layer, expected) in [(1.5, 20.5), (2.5, 20.5), (0.4, 0.5), (-3.0, 0.5), (9.0, 20.5)] {
            let (value, taps) = sampler.sample_traced([0.5, 0.5, layer]);
            assert_eq!(taps.len(), 4, "layer {layer}");
            assert_eq!(value.r, expected, "layer {layer}");
        }
    }

    #[test]
    fn array_1d_layer_axis() {
        let desc = ImageDescriptor::image_1d_array(4, 3, PixelFormat::R_FLOAT).unwrap();
        let mut image = ImageMemory::new(desc);
        image.fill_with(|x, y, _| from_channels([(y * 10 + x) as f64, 0.0, 0.0, 1.0]));
        let nearest = config(true, AddressingMode::ClampToEdge, FilterMode::Nearest);
        let sampler = ReferenceSampler::new(&image, nearest).unwrap();
        let (value, taps) = sampler.sample_traced([0.25, 2.0, 0.0]);
        assert_eq!(taps[0].coord, [1, 2, 0]);
        assert_eq!(value.r, 21.0);
    }

    #[test]
    fn integer_formats_sample_nearest_only() {
        let desc = ImageDescriptor::image_2d(2, 2, PixelFormat::RGBA_UNSIGNED_INT8).unwrap();
        let mut image = ImageMemory::new(desc);
        image.write_pixel(1, 0, 0, &from_channels([200.0, 3.0, 0.0, 7.0]));

        let linear = config(false, AddressingMode::Clamp, FilterMode::Linear);
        assert_eq!(
            ReferenceSampler::new(&image, linear).unwrap_err(),
            SamplerError::LinearOnIntegerFormat {
                format: PixelFormat::RGBA_UNSIGNED_INT8
            }
        );

        let nearest = config(false, AddressingMode::Clamp, FilterMode::Nearest);
        let sampler = ReferenceSampler::new(&image, nearest).unwrap();
        assert_eq!(channels(&sampler.sample([1.5, 0.5, 0.0])), [200.0, 3.0, 0.0, 7.0]);
    }

    #[test]
    fn repeat_needs_normalized_coords() {
        for addressing in [AddressingMode::Repeat, AddressingMode::MirroredRepeat] {
            assert_eq!(
                SamplerConfig::new(false, addressing, FilterMode::Nearest),
                Err(SamplerError::RepeatRequiresNormalized { addressing })
            );
        }
        assert_eq!(SamplerConfig::all().count(), 16);
        assert!(SamplerConfig::all().all(|c| {
            c.normalized_coords() || !c.addressing().requires_normalized()
        }));
    }

    #[test]
    fn nearest_keeps_negative_zero() {
        let image = {
            let desc = ImageDescriptor::image_1d(1, PixelFormat::R_FLOAT).unwrap();
            let mut image = ImageMemory::new(desc);
            image.write_pixel(0, 0, 0, &from_channels([-0.0, 0.0, 0.0, 1.0]));
            image
        };
        let nearest = config(false, AddressingMode::None, FilterMode::Nearest);
        assert!(red(&image, nearest, 0.5).is_sign_negative());
    }
}
