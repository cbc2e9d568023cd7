//! Host-side ground truth for image conformance testing.
//!
//! This crate holds the pieces a compute-API image test needs besides the
//! driver itself:
//!
//! - [`GuardedRegion`]: content bytes between no-access guard pages, so a
//!   driver that reads or writes out of bounds faults the process
//! - [`PixelFormat`] / [`decode`] / [`encode`]: table-driven pixel codec
//!   between stored bytes and the canonical [`PixelValue`]
//! - [`ImageDescriptor`] / [`ImageMemory`]: pixel-addressed image storage
//!   with pitch overrides and border reads
//! - [`ReferenceSampler`]: what a conformant sampler returns for a
//!   coordinate under every addressing and filter mode
//! - [`check_pixel`] / [`VerifyReport`]: tolerance checks that report
//!   mismatches as data
//!
//! Typical flow: build an [`ImageMemory`] (guarded or not), fill it, hand
//! [`ImageMemory::as_ptr`] and the descriptor to the driver, then compare
//! what the driver returns against [`ReferenceSampler::sample`].
//!
//! The library emits `tracing` events and never installs a subscriber.

mod codec;
mod format;
mod guard;
mod half;
mod image;
mod pixel;
mod sampler;
mod verify;

pub use codec::{
    decode, encode, encode_with, narrow, narrow_with, random_pixel, random_pixel_bytes,
};
pub use format::{
    ChannelDataType, ChannelKind, ChannelOrder, FormatError, FormatInfo, PackedField,
    PackedLayout, PixelFormat, Slot, lookup,
};
pub use guard::{ALIGN_RIGHT_ENV, Alignment, GuardError, GuardOptions, GuardedRegion, page_size};
pub use half::{HalfRounding, f32_to_half, half_to_f32};
pub use image::{Dimensionality, ImageDescriptor, ImageError, ImageMemory};
pub use pixel::{PixelValue, border_color, channels, from_channels};
pub use sampler::{AddressingMode, FilterMode, ReferenceSampler, SamplerConfig, SamplerError, Tap};
pub use verify::{Mismatch, Tolerance, VerifyReport, check_pixel, ulp_error};

pub use rgb;
pub use rgb::Rgba;
