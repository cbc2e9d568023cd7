//! Image memory model.
//!
//! [`ImageDescriptor`] describes an image's shape, pitches and format.
//! [`ImageMemory`] owns the backing bytes (heap or guard-paged) and offers
//! pixel-addressed access through the codec.
//!
//! Logical coordinates outside the image read as the border colour. That
//! is defined behaviour, modelling the sampler hardware, and is unrelated
//! to the guard pages, which protect the storage itself.

use core::fmt;

use rand::Rng;
use tracing::debug;

use crate::codec::{decode, encode_with, random_pixel_bytes};
use crate::format::PixelFormat;
use crate::guard::{GuardError, GuardOptions, GuardedRegion};
use crate::half::HalfRounding;
use crate::pixel::{PixelValue, border_color};

// ---------------------------------------------------------------------------
// Dimensionality
// ---------------------------------------------------------------------------

/// Image type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Dimensionality {
    /// Row of pixels.
    Image1d,
    Image2d,
    /// Stack of slices; depth is the third coordinate.
    Image3d,
    /// Array of 1D images; the layer is the second coordinate.
    Image1dArray,
    /// Array of 2D images; the layer is the third coordinate.
    Image2dArray,
}

impl Dimensionality {
    /// Number of coordinate axes that are filtered (the layer axis is not).
    pub const fn filtered_axes(self) -> usize {
        match self {
            Self::Image1d | Self::Image1dArray => 1,
            Self::Image2d | Self::Image2dArray => 2,
            Self::Image3d => 3,
        }
    }

    /// Coordinate index of the array layer, if any.
    pub const fn layer_axis(self) -> Option<usize> {
        match self {
            Self::Image1dArray => Some(1),
            Self::Image2dArray => Some(2),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ImageError
// ---------------------------------------------------------------------------

/// Errors from image construction.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ImageError {
    #[error(
        "invalid image dimensions {width}x{height}x{depth} (array size {array_size})"
    )]
    InvalidDimensions {
        width: usize,
        height: usize,
        depth: usize,
        array_size: usize,
    },
    #[error("row pitch {pitch} is smaller than width * bytes_per_pixel ({min})")]
    RowPitchTooSmall { pitch: usize, min: usize },
    #[error("slice pitch {pitch} is smaller than rows * row_pitch ({min})")]
    SlicePitchTooSmall { pitch: usize, min: usize },
    #[error("image size overflows usize")]
    SizeOverflow,
    #[error("backing store has {len} bytes, image needs {required}")]
    InsufficientData { len: usize, required: usize },
    #[error(transparent)]
    Guard(#[from] GuardError),
}

// ---------------------------------------------------------------------------
// ImageDescriptor
// ---------------------------------------------------------------------------

/// Shape, pitches and format of one image.
///
/// Pitches are in bytes. A 1D array stores each layer one slice pitch
/// apart, as if it were a stack of one-row images.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    dimensionality: Dimensionality,
    width: usize,
    height: usize,
    depth: usize,
    array_size: usize,
    row_pitch: usize,
    slice_pitch: usize,
    format: PixelFormat,
}

impl ImageDescriptor {
    /// Tightly packed 1D image.
    pub fn image_1d(width: usize, format: PixelFormat) -> Result<Self, ImageError> {
        Self::new(Dimensionality::Image1d, width, 1, 1, 1, format)
    }

    /// Tightly packed 2D image.
    pub fn image_2d(width: usize, height: usize, format: PixelFormat) -> Result<Self, ImageError> {
        Self::new(Dimensionality::Image2d, width, height, 1, 1, format)
    }

    /// Tightly packed 3D image.
    pub fn image_3d(
        width: usize,
        height: usize,
        depth: usize,
        format: PixelFormat,
    ) -> Result<Self, ImageError> {
        Self::new(Dimensionality::Image3d, width, height, depth, 1, format)
    }

    /// Tightly packed array of `array_size` 1D layers.
    pub fn image_1d_array(
        width: usize,
        array_size: usize,
        format: PixelFormat,
    ) -> Result<Self, ImageError> {
        Self::new(Dimensionality::Image1dArray, width, 1, 1, array_size, format)
    }

    /// Tightly packed array of `array_size` 2D layers.
    pub fn image_2d_array(
        width: usize,
        height: usize,
        array_size: usize,
        format: PixelFormat,
    ) -> Result<Self, ImageError> {
        Self::new(
            Dimensionality::Image2dArray,
            width,
            height,
            1,
            array_size,
            format,
        )
    }

    /// Create a descriptor with tightly packed pitches.
    ///
    /// Axes that the dimensionality does not use must be 1.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidDimensions`] for zero or unused-but-set
    /// extents and [`ImageError::SizeOverflow`] if the pitches overflow.
    pub fn new(
        dimensionality: Dimensionality,
        width: usize,
        height: usize,
        depth: usize,
        array_size: usize,
        format: PixelFormat,
    ) -> Result<Self, ImageError> {
        let invalid = || ImageError::InvalidDimensions {
            width,
            height,
            depth,
            array_size,
        };
        let (uses_height, uses_depth, uses_array) = match dimensionality {
            Dimensionality::Image1d => (false, false, false),
            Dimensionality::Image2d => (true, false, false),
            Dimensionality::Image3d => (true, true, false),
            Dimensionality::Image1dArray => (false, false, true),
            Dimensionality::Image2dArray => (true, false, true),
        };
        let axis_ok = |used: bool, n: usize| if used { n > 0 } else { n == 1 };
        if width == 0
            || !axis_ok(uses_height, height)
            || !axis_ok(uses_depth, depth)
            || !axis_ok(uses_array, array_size)
        {
            return Err(invalid());
        }

        let row_pitch = width
            .checked_mul(format.bytes_per_pixel())
            .ok_or(ImageError::SizeOverflow)?;
        let slice_pitch = row_pitch
            .checked_mul(height)
            .ok_or(ImageError::SizeOverflow)?;
        let desc = Self {
            dimensionality,
            width,
            height,
            depth,
            array_size,
            row_pitch,
            slice_pitch,
            format,
        };
        desc.slices()
            .checked_mul(slice_pitch)
            .ok_or(ImageError::SizeOverflow)?;
        Ok(desc)
    }

    /// Override the row pitch. The slice pitch is reset to
    /// `rows * row_pitch`; override it afterwards if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::RowPitchTooSmall`] if `pitch < width * bpp`.
    pub fn with_row_pitch(mut self, pitch: usize) -> Result<Self, ImageError> {
        let min = self.width * self.format.bytes_per_pixel();
        if pitch < min {
            return Err(ImageError::RowPitchTooSmall { pitch, min });
        }
        self.row_pitch = pitch;
        self.slice_pitch = pitch
            .checked_mul(self.rows())
            .ok_or(ImageError::SizeOverflow)?;
        self.slices()
            .checked_mul(self.slice_pitch)
            .ok_or(ImageError::SizeOverflow)?;
        Ok(self)
    }

    /// Override the slice pitch.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::SlicePitchTooSmall`] if
    /// `pitch < rows * row_pitch`.
    pub fn with_slice_pitch(mut self, pitch: usize) -> Result<Self, ImageError> {
        let min = self.rows() * self.row_pitch;
        if pitch < min {
            return Err(ImageError::SlicePitchTooSmall { pitch, min });
        }
        self.slices()
            .checked_mul(pitch)
            .ok_or(ImageError::SizeOverflow)?;
        self.slice_pitch = pitch;
        Ok(self)
    }

    /// Image kind.
    #[inline]
    pub fn dimensionality(&self) -> Dimensionality {
        self.dimensionality
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels, 1 for 1D kinds.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Depth in pixels, 1 unless 3D.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Layer count, 1 unless arrayed.
    #[inline]
    pub fn array_size(&self) -> usize {
        self.array_size
    }

    /// Bytes from one row to the next.
    #[inline]
    pub fn row_pitch(&self) -> usize {
        self.row_pitch
    }

    /// Bytes from one slice or layer to the next.
    #[inline]
    pub fn slice_pitch(&self) -> usize {
        self.slice_pitch
    }

    /// Pixel format of every texel.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Stored size of one pixel.
    #[inline]
    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    /// Logical extent of each coordinate axis.
    ///
    /// Array images report the layer count on their layer axis.
    pub fn extent(&self) -> [usize; 3] {
        match self.dimensionality {
            Dimensionality::Image1d => [self.width, 1, 1],
            Dimensionality::Image2d => [self.width, self.height, 1],
            Dimensionality::Image3d => [self.width, self.height, self.depth],
            Dimensionality::Image1dArray => [self.width, self.array_size, 1],
            Dimensionality::Image2dArray => [self.width, self.height, self.array_size],
        }
    }

    /// Rows per slice in storage.
    fn rows(&self) -> usize {
        self.height
    }

    /// Slices in storage: depth for 3D, layers for arrays.
    fn slices(&self) -> usize {
        match self.dimensionality {
            Dimensionality::Image3d => self.depth,
            Dimensionality::Image1dArray | Dimensionality::Image2dArray => self.array_size,
            _ => 1,
        }
    }

    /// Total backing bytes: every slice at full slice pitch.
    pub fn byte_size(&self) -> usize {
        self.slices() * self.slice_pitch
    }

    /// Whether a logical coordinate lies inside the image.
    pub fn contains(&self, x: i64, y: i64, z: i64) -> bool {
        let [w, h, d] = self.extent();
        in_range(x, w) && in_range(y, h) && in_range(z, d)
    }

    /// Byte offset of an in-range logical coordinate.
    ///
    /// `z * slice_pitch + y * row_pitch + x * bytes_per_pixel` on storage
    /// coordinates. This is the only place addresses are computed.
    #[inline]
    pub fn pixel_offset(&self, x: usize, y: usize, z: usize) -> usize {
        let (sy, sz) = match self.dimensionality {
            Dimensionality::Image1dArray => (0, y),
            _ => (y, z),
        };
        sz * self.slice_pitch + sy * self.row_pitch + x * self.bytes_per_pixel()
    }
}

#[inline]
fn in_range(c: i64, extent: usize) -> bool {
    c >= 0 && (c as u64) < extent as u64
}

impl fmt::Debug for ImageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [w, h, d] = self.extent();
        write!(
            f,
            "ImageDescriptor({:?} {w}x{h}x{d}, {}, row_pitch {}, slice_pitch {})",
            self.dimensionality, self.format, self.row_pitch, self.slice_pitch
        )
    }
}

// ---------------------------------------------------------------------------
// ImageMemory
// ---------------------------------------------------------------------------

enum Backing {
    Heap(Vec<u8>),
    Guarded(GuardedRegion),
}

/// Backing bytes for one image plus pixel-addressed access.
pub struct ImageMemory {
    descriptor: ImageDescriptor,
    backing: Backing,
}

impl ImageMemory {
    /// Zero-filled heap-backed image.
    pub fn new(descriptor: ImageDescriptor) -> Self {
        debug!(?descriptor, "created heap image");
        Self {
            backing: Backing::Heap(vec![0u8; descriptor.byte_size()]),
            descriptor,
        }
    }

    /// Zero-filled image in a guard-paged region.
    ///
    /// # Errors
    ///
    /// Propagates [`GuardError`] if the mapping fails.
    pub fn new_guarded(
        descriptor: ImageDescriptor,
        options: GuardOptions,
    ) -> Result<Self, ImageError> {
        let region = GuardedRegion::allocate(descriptor.byte_size(), options)?;
        debug!(?descriptor, ?region, "created guarded image");
        Ok(Self {
            descriptor,
            backing: Backing::Guarded(region),
        })
    }

    /// Wrap existing bytes, for example a buffer read back from a device.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InsufficientData`] if `data` is shorter than
    /// [`ImageDescriptor::byte_size`].
    pub fn from_vec(descriptor: ImageDescriptor, data: Vec<u8>) -> Result<Self, ImageError> {
        let required = descriptor.byte_size();
        if data.len() < required {
            return Err(ImageError::InsufficientData {
                len: data.len(),
                required,
            });
        }
        Ok(Self {
            descriptor,
            backing: Backing::Heap(data),
        })
    }

    /// Geometry and format.
    #[inline]
    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.descriptor
    }

    /// Shorthand for `descriptor().format()`.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.descriptor.format
    }

    /// Whether the bytes live in a guard-paged region.
    #[inline]
    pub fn is_guarded(&self) -> bool {
        matches!(self.backing, Backing::Guarded(_))
    }

    /// Backing bytes, [`ImageDescriptor::byte_size`] long.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Heap(v) => v,
            Backing::Guarded(r) => r.as_slice(),
        }
    }

    /// Backing bytes, writable.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.backing {
            Backing::Heap(v) => v,
            Backing::Guarded(r) => r.as_mut_slice(),
        }
    }

    /// Pointer to the first pixel, for driver image creation.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.as_bytes().as_ptr()
    }

    /// Mutable pointer to the first pixel.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.as_bytes_mut().as_mut_ptr()
    }

    /// Stored bytes of one in-range pixel.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is outside the image.
    pub fn pixel_bytes(&self, x: usize, y: usize, z: usize) -> &[u8] {
        let offset = self.checked_offset(x, y, z);
        &self.as_bytes()[offset..offset + self.descriptor.bytes_per_pixel()]
    }

    /// Decode the pixel at a logical coordinate.
    ///
    /// Out-of-range coordinates, negative ones included, return
    /// [`border_color`] for the format.
    pub fn read_pixel(&self, x: i64, y: i64, z: i64) -> PixelValue {
        if !self.descriptor.contains(x, y, z) {
            return border_color(self.format());
        }
        let offset = self
            .descriptor
            .pixel_offset(x as usize, y as usize, z as usize);
        decode(&self.as_bytes()[offset..], self.format())
    }

    /// Encode a pixel at an in-range logical coordinate.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is outside the image; writes are never
    /// clamped.
    pub fn write_pixel(&mut self, x: usize, y: usize, z: usize, value: &PixelValue) {
        self.write_pixel_with(x, y, z, value, HalfRounding::NearestEven);
    }

    /// [`write_pixel`](Self::write_pixel) with an explicit half rounding mode.
    pub fn write_pixel_with(
        &mut self,
        x: usize,
        y: usize,
        z: usize,
        value: &PixelValue,
        rounding: HalfRounding,
    ) {
        let offset = self.checked_offset(x, y, z);
        let format = self.format();
        encode_with(value, format, rounding, &mut self.as_bytes_mut()[offset..]);
    }

    /// Write every pixel from a generator.
    pub fn fill_with(&mut self, mut pixel: impl FnMut(usize, usize, usize) -> PixelValue) {
        let [w, h, d] = self.descriptor.extent();
        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    let value = pixel(x, y, z);
                    self.write_pixel(x, y, z, &value);
                }
            }
        }
    }

    /// Fill every pixel with random bytes the format stores canonically.
    ///
    /// Row and slice padding is left untouched.
    pub fn fill_random<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let [w, h, d] = self.descriptor.extent();
        let format = self.format();
        let bpp = format.bytes_per_pixel();
        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    let offset = self.descriptor.pixel_offset(x, y, z);
                    let bytes = &mut self.as_bytes_mut()[offset..offset + bpp];
                    random_pixel_bytes(format, rng, bytes);
                }
            }
        }
    }

    fn checked_offset(&self, x: usize, y: usize, z: usize) -> usize {
        let [w, h, d] = self.descriptor.extent();
        assert!(
            x < w && y < h && z < d,
            "pixel ({x}, {y}, {z}) out of bounds ({w}x{h}x{d})"
        );
        self.descriptor.pixel_offset(x, y, z)
    }
}

impl fmt::Debug for ImageMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ImageMemory({:?}, guarded: {})",
            self.descriptor,
            self.is_guarded()
        )
    }
}
