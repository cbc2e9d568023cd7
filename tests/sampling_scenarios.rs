//! Sampling laws checked across formats and sampler configurations.

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use zensample::{
    AddressingMode, FilterMode, ImageDescriptor, ImageMemory, PixelFormat, ReferenceSampler,
    SamplerConfig, border_color, channels, from_channels,
};

/// RGBA/UNORM_INT8 4x4 with pixel (x, y) = (x*60, y*60, 0, 255).
fn scenario_image() -> ImageMemory {
    let desc = ImageDescriptor::image_2d(4, 4, PixelFormat::RGBA_UNORM_INT8).unwrap();
    let mut bytes = Vec::with_capacity(64);
    for y in 0..4u8 {
        for x in 0..4u8 {
            bytes.extend_from_slice(&[x * 60, y * 60, 0, 255]);
        }
    }
    ImageMemory::from_vec(desc, bytes).unwrap()
}

fn random_image(format: PixelFormat, width: usize, height: usize, seed: u64) -> ImageMemory {
    let desc = ImageDescriptor::image_2d(width, height, format).unwrap();
    let mut image = ImageMemory::new(desc);
    image.fill_random(&mut StdRng::seed_from_u64(seed));
    image
}

fn config(normalized: bool, addressing: AddressingMode, filter: FilterMode) -> SamplerConfig {
    SamplerConfig::new(normalized, addressing, filter).unwrap()
}

#[test]
fn nearest_clamp_to_edge_reads_first_pixel() {
    let image = scenario_image();
    let cfg = config(true, AddressingMode::ClampToEdge, FilterMode::Nearest);
    let sampler = ReferenceSampler::new(&image, cfg).unwrap();
    let value = sampler.sample([0.5 / 4.0, 0.5 / 4.0, 0.0]);
    assert_eq!(channels(&value), [0.0, 0.0, 0.0, 1.0]);
    assert_eq!(channels(&value), channels(&image.read_pixel(0, 0, 0)));

    let value = sampler.sample([3.5 / 4.0, 1.5 / 4.0, 0.0]);
    assert_eq!(channels(&value), [180.0 / 255.0, 60.0 / 255.0, 0.0, 1.0]);
}

#[test]
fn clamp_outside_returns_border_not_content() {
    let image = scenario_image();
    let cfg = config(false, AddressingMode::Clamp, FilterMode::Nearest);
    let sampler = ReferenceSampler::new(&image, cfg).unwrap();
    let (value, taps) = sampler.sample_traced([-1.0, -1.0, 0.0]);
    assert_eq!(taps.len(), 1);
    assert_eq!(taps[0].coord, [-1, -1, 0]);
    // RGBA stores alpha, so the border is transparent black, which also
    // tells it apart from the opaque content at (0, 0).
    assert_eq!(channels(&value), [0.0; 4]);
    assert_ne!(channels(&value), channels(&image.read_pixel(0, 0, 0)));
}

#[test]
fn border_law_for_every_format() {
    let far = [[-1000.25, 1000.75], [-50.25, 50.5]];
    for format in PixelFormat::all() {
        let image = random_image(format, 8, 8, 11);
        let border = channels(&border_color(format));
        assert_eq!(border[..3], [0.0; 3]);
        assert_eq!(border[3], if format.has_alpha() { 0.0 } else { 1.0 });

        for addressing in [AddressingMode::Clamp, AddressingMode::None] {
            for filter in [FilterMode::Nearest, FilterMode::Linear] {
                if filter == FilterMode::Linear && format.is_integer() {
                    continue;
                }
                for (normalized, [lo, hi]) in [(false, far[0]), (true, far[1])] {
                    let cfg = config(normalized, addressing, filter);
                    let sampler = ReferenceSampler::new(&image, cfg).unwrap();
                    let coords = [
                        [lo, lo, 0.0],
                        [hi, lo, 0.0],
                        [lo, hi, 0.0],
                        [hi, hi, 0.0],
                        [f64::NEG_INFINITY, 0.5, 0.0],
                        [f64::INFINITY, lo, 0.0],
                        [0.5, f64::INFINITY, 0.0],
                    ];
                    for coord in coords {
                        assert_eq!(
                            channels(&sampler.sample(coord)),
                            border,
                            "{format} {cfg:?} {coord:?}"
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn clamp_to_edge_never_reads_border() {
    let desc = ImageDescriptor::image_2d(3, 3, PixelFormat::RGBA_FLOAT).unwrap();
    let mut image = ImageMemory::new(desc);
    image.fill_with(|_, _, _| from_channels([0.5, 0.5, 0.5, 0.5]));
    let cfg = config(false, AddressingMode::ClampToEdge, FilterMode::Linear);
    let sampler = ReferenceSampler::new(&image, cfg).unwrap();
    for coord in [[-9.0, -9.0, 0.0], [100.0, 1.0, 0.0], [1.5, 77.25, 0.0]] {
        assert_eq!(channels(&sampler.sample(coord)), [0.5; 4]);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// On a pixel centre the linear weights are (1, 0) per axis, so linear
    /// and nearest agree.
    #[test]
    fn linear_on_pixel_centre_equals_nearest(
        seed in any::<u64>(),
        i in -3i64..11,
        j in -3i64..11,
        mode_index in 0usize..5,
    ) {
        let addressing = AddressingMode::ALL[mode_index];
        let image = random_image(PixelFormat::RGBA_FLOAT, 8, 8, seed);
        let normalized = addressing.requires_normalized() || seed % 2 == 0;
        let (i, j) = if addressing.requires_normalized() {
            (i.rem_euclid(8), j.rem_euclid(8))
        } else {
            (i, j)
        };
        let centre = |k: i64| {
            let u = k as f64 + 0.5;
            if normalized { u / 8.0 } else { u }
        };
        let coord = [centre(i), centre(j), 0.0];

        let nearest = ReferenceSampler::new(&image, config(normalized, addressing, FilterMode::Nearest))
            .unwrap()
            .sample(coord);
        let linear = ReferenceSampler::new(&image, config(normalized, addressing, FilterMode::Linear))
            .unwrap()
            .sample(coord);
        prop_assert_eq!(channels(&linear), channels(&nearest));
    }

    /// Dyadic coordinates keep `s - floor(s)` exact under integer shifts.
    #[test]
    fn repeat_wraps_by_whole_periods(
        seed in any::<u64>(),
        s in -4096i32..4096,
        t in -4096i32..4096,
        k in -8i32..8,
        m in -8i32..8,
        linear in any::<bool>(),
    ) {
        let image = random_image(PixelFormat::RGBA_HALF, 8, 4, seed);
        let filter = if linear { FilterMode::Linear } else { FilterMode::Nearest };
        let sampler = ReferenceSampler::new(&image, config(true, AddressingMode::Repeat, filter)).unwrap();

        let s = f64::from(s) / 1024.0;
        let t = f64::from(t) / 1024.0;
        let base = sampler.sample([s, t, 0.0]);
        let shifted = sampler.sample([s + f64::from(k), t + f64::from(m), 0.0]);
        prop_assert_eq!(channels(&base), channels(&shifted));
    }
}
