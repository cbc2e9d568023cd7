//! Pixel format descriptors and the closed format table.
//!
//! A [`PixelFormat`] is a validated `(ChannelOrder, ChannelDataType)` pair.
//! Validation happens once in [`PixelFormat::new`]; the resulting value
//! carries its [`FormatInfo`] so the codec never has to re-dispatch on the
//! pair.

use core::fmt;

// ---------------------------------------------------------------------------
// Channel order
// ---------------------------------------------------------------------------

/// Which channels a pixel stores, and in what order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum ChannelOrder {
    R,
    A,
    Rg,
    Ra,
    Rgb,
    Rgba,
    /// Blue, green, red, alpha in memory order.
    Bgra,
    Argb,
    Abgr,
    /// Single value replicated into all four channels, including alpha.
    Intensity,
    /// Single value replicated into red, green and blue.
    Luminance,
    Depth,
    /// Red plus one padding channel.
    Rx,
    /// Red, green plus one padding channel.
    Rgx,
    /// Red, green, blue plus padding. Only used with packed data types.
    Rgbx,
    Srgb,
    Srgbx,
    Srgba,
    Sbgra,
}

/// What a stored channel slot means once decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    R,
    G,
    B,
    A,
    Intensity,
    Luminance,
    Depth,
    /// Stored but ignored on decode, written as zero on encode.
    Padding,
}

impl ChannelOrder {
    /// Every channel order, in declaration order.
    pub const ALL: [ChannelOrder; 19] = [
        Self::R,
        Self::A,
        Self::Rg,
        Self::Ra,
        Self::Rgb,
        Self::Rgba,
        Self::Bgra,
        Self::Argb,
        Self::Abgr,
        Self::Intensity,
        Self::Luminance,
        Self::Depth,
        Self::Rx,
        Self::Rgx,
        Self::Rgbx,
        Self::Srgb,
        Self::Srgbx,
        Self::Srgba,
        Self::Sbgra,
    ];

    /// Stored slots in memory order.
    pub const fn slots(self) -> &'static [Slot] {
        use Slot::*;
        match self {
            Self::R => &[R],
            Self::A => &[A],
            Self::Rg => &[R, G],
            Self::Ra => &[R, A],
            Self::Rgb | Self::Srgb => &[R, G, B],
            Self::Rgba | Self::Srgba => &[R, G, B, A],
            Self::Bgra | Self::Sbgra => &[B, G, R, A],
            Self::Argb => &[A, R, G, B],
            Self::Abgr => &[A, B, G, R],
            Self::Intensity => &[Intensity],
            Self::Luminance => &[Luminance],
            Self::Depth => &[Depth],
            Self::Rx => &[R, Padding],
            Self::Rgx => &[R, G, Padding],
            Self::Rgbx | Self::Srgbx => &[R, G, B, Padding],
        }
    }

    /// Number of stored channels, padding included.
    #[inline]
    pub const fn channel_count(self) -> usize {
        self.slots().len()
    }

    /// Whether the decoded alpha comes from stored data.
    ///
    /// Intensity counts: its single value is replicated into alpha.
    pub const fn has_alpha(self) -> bool {
        matches!(
            self,
            Self::A
                | Self::Ra
                | Self::Rgba
                | Self::Bgra
                | Self::Argb
                | Self::Abgr
                | Self::Intensity
                | Self::Srgba
                | Self::Sbgra
        )
    }

    /// Whether colour channels are stored with the sRGB transfer curve.
    pub const fn is_srgb(self) -> bool {
        matches!(self, Self::Srgb | Self::Srgbx | Self::Srgba | Self::Sbgra)
    }

    /// Short display name, e.g. `RGBA`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::R => "R",
            Self::A => "A",
            Self::Rg => "RG",
            Self::Ra => "RA",
            Self::Rgb => "RGB",
            Self::Rgba => "RGBA",
            Self::Bgra => "BGRA",
            Self::Argb => "ARGB",
            Self::Abgr => "ABGR",
            Self::Intensity => "INTENSITY",
            Self::Luminance => "LUMINANCE",
            Self::Depth => "DEPTH",
            Self::Rx => "Rx",
            Self::Rgx => "RGx",
            Self::Rgbx => "RGBx",
            Self::Srgb => "sRGB",
            Self::Srgbx => "sRGBx",
            Self::Srgba => "sRGBA",
            Self::Sbgra => "sBGRA",
        }
    }
}

// ---------------------------------------------------------------------------
// Channel data type
// ---------------------------------------------------------------------------

/// Numeric encoding of each channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum ChannelDataType {
    SnormInt8,
    SnormInt16,
    UnormInt8,
    UnormInt16,
    /// 5-6-5 packed into 16 bits.
    UnormShort565,
    /// 5-5-5 packed into 16 bits, top bit unused.
    UnormShort555,
    /// 10-10-10 packed into 32 bits, top two bits unused.
    UnormInt101010,
    /// 10-10-10-2 packed into 32 bits, alpha in the low two bits.
    UnormInt1010102,
    SignedInt8,
    SignedInt16,
    SignedInt32,
    UnsignedInt8,
    UnsignedInt16,
    UnsignedInt32,
    HalfFloat,
    Float,
}

impl ChannelDataType {
    /// Every data type, in declaration order.
    pub const ALL: [ChannelDataType; 16] = [
        Self::SnormInt8,
        Self::SnormInt16,
        Self::UnormInt8,
        Self::UnormInt16,
        Self::UnormShort565,
        Self::UnormShort555,
        Self::UnormInt101010,
        Self::UnormInt1010102,
        Self::SignedInt8,
        Self::SignedInt16,
        Self::SignedInt32,
        Self::UnsignedInt8,
        Self::UnsignedInt16,
        Self::UnsignedInt32,
        Self::HalfFloat,
        Self::Float,
    ];

    /// Bit-field layout for packed types, `None` for one-word-per-channel types.
    pub const fn packed_layout(self) -> Option<PackedLayout> {
        match self {
            Self::UnormShort565 => Some(PackedLayout::SHORT_565),
            Self::UnormShort555 => Some(PackedLayout::SHORT_555),
            Self::UnormInt101010 => Some(PackedLayout::INT_101010),
            Self::UnormInt1010102 => Some(PackedLayout::INT_101010_2),
            _ => None,
        }
    }

    /// Whether several channels share one stored word.
    pub const fn is_packed(self) -> bool {
        self.packed_layout().is_some()
    }

    /// Short display name, e.g. `UNORM_INT8`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::SnormInt8 => "SNORM_INT8",
            Self::SnormInt16 => "SNORM_INT16",
            Self::UnormInt8 => "UNORM_INT8",
            Self::UnormInt16 => "UNORM_INT16",
            Self::UnormShort565 => "UNORM_SHORT_565",
            Self::UnormShort555 => "UNORM_SHORT_555",
            Self::UnormInt101010 => "UNORM_INT_101010",
            Self::UnormInt1010102 => "UNORM_INT_101010_2",
            Self::SignedInt8 => "SIGNED_INT8",
            Self::SignedInt16 => "SIGNED_INT16",
            Self::SignedInt32 => "SIGNED_INT32",
            Self::UnsignedInt8 => "UNSIGNED_INT8",
            Self::UnsignedInt16 => "UNSIGNED_INT16",
            Self::UnsignedInt32 => "UNSIGNED_INT32",
            Self::HalfFloat => "HALF_FLOAT",
            Self::Float => "FLOAT",
        }
    }
}

// ---------------------------------------------------------------------------
// Packed layouts
// ---------------------------------------------------------------------------

/// One bit field inside a packed word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PackedField {
    pub shift: u8,
    pub bits: u8,
}

impl PackedField {
    /// Field mask, shifted down to bit zero.
    #[inline]
    pub const fn mask(self) -> u32 {
        (1u32 << self.bits) - 1
    }
}

/// Shift/mask table for a packed word. Fields are listed in slot order
/// (red, green, blue, then alpha if present).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PackedLayout {
    /// Size of the packed word (2 or 4).
    pub word_bytes: u8,
    pub fields: &'static [PackedField],
}

const fn field(shift: u8, bits: u8) -> PackedField {
    PackedField { shift, bits }
}

impl PackedLayout {
    pub const SHORT_565: Self = Self {
        word_bytes: 2,
        fields: &[field(11, 5), field(5, 6), field(0, 5)],
    };

    pub const SHORT_555: Self = Self {
        word_bytes: 2,
        fields: &[field(10, 5), field(5, 5), field(0, 5)],
    };

    pub const INT_101010: Self = Self {
        word_bytes: 4,
        fields: &[field(20, 10), field(10, 10), field(0, 10)],
    };

    pub const INT_101010_2: Self = Self {
        word_bytes: 4,
        fields: &[field(22, 10), field(12, 10), field(2, 10), field(0, 2)],
    };
}

// ---------------------------------------------------------------------------
// Format table
// ---------------------------------------------------------------------------

/// Numeric class of a channel, used by the codec to pick a conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Unorm,
    Snorm,
    SignedInt,
    UnsignedInt,
    Half,
    Float,
}

/// Static facts about a validated format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FormatInfo {
    /// Stored channels, padding included (1 to 4).
    pub channel_count: u8,
    /// Bytes per stored channel. For packed types this is the whole word.
    pub bytes_per_channel: u8,
    pub bytes_per_pixel: u8,
    pub signed: bool,
    pub normalized: bool,
    pub kind: ChannelKind,
    pub packed: Option<PackedLayout>,
}

/// Per-data-type row of the table: `(bytes_per_channel, kind)`.
const fn data_type_row(data_type: ChannelDataType) -> (u8, ChannelKind) {
    use ChannelDataType as T;
    match data_type {
        T::SnormInt8 => (1, ChannelKind::Snorm),
        T::SnormInt16 => (2, ChannelKind::Snorm),
        T::UnormInt8 => (1, ChannelKind::Unorm),
        T::UnormInt16 => (2, ChannelKind::Unorm),
        T::UnormShort565 | T::UnormShort555 => (2, ChannelKind::Unorm),
        T::UnormInt101010 | T::UnormInt1010102 => (4, ChannelKind::Unorm),
        T::SignedInt8 => (1, ChannelKind::SignedInt),
        T::SignedInt16 => (2, ChannelKind::SignedInt),
        T::SignedInt32 => (4, ChannelKind::SignedInt),
        T::UnsignedInt8 => (1, ChannelKind::UnsignedInt),
        T::UnsignedInt16 => (2, ChannelKind::UnsignedInt),
        T::UnsignedInt32 => (4, ChannelKind::UnsignedInt),
        T::HalfFloat => (2, ChannelKind::Half),
        T::Float => (4, ChannelKind::Float),
    }
}

/// Whether the `(order, data_type)` pair is part of the table.
const fn is_supported(order: ChannelOrder, data_type: ChannelDataType) -> bool {
    use ChannelDataType as T;
    use ChannelOrder as O;
    match order {
        O::R | O::A | O::Rg | O::Ra | O::Rgba | O::Rx | O::Rgx => {
            !data_type.is_packed() || matches!((order, data_type), (O::Rgba, T::UnormInt1010102))
        }
        O::Rgb => !matches!(data_type, T::UnormInt1010102),
        O::Rgbx => matches!(
            data_type,
            T::UnormShort565 | T::UnormShort555 | T::UnormInt101010
        ),
        O::Bgra | O::Argb | O::Abgr => matches!(
            data_type,
            T::UnormInt8 | T::SnormInt8 | T::SignedInt8 | T::UnsignedInt8
        ),
        O::Intensity | O::Luminance => matches!(
            data_type,
            T::UnormInt8
                | T::UnormInt16
                | T::SnormInt8
                | T::SnormInt16
                | T::HalfFloat
                | T::Float
        ),
        O::Depth => matches!(data_type, T::UnormInt16 | T::Float),
        O::Srgb | O::Srgbx | O::Srgba | O::Sbgra => matches!(data_type, T::UnormInt8),
    }
}

/// Look up the table row for a pair, `None` if the pair is not supported.
pub const fn lookup(order: ChannelOrder, data_type: ChannelDataType) -> Option<FormatInfo> {
    if !is_supported(order, data_type) {
        return None;
    }
    let (bytes_per_channel, kind) = data_type_row(data_type);
    let packed = data_type.packed_layout();
    let channel_count = order.channel_count() as u8;
    let bytes_per_pixel = match packed {
        Some(layout) => layout.word_bytes,
        None => channel_count * bytes_per_channel,
    };
    Some(FormatInfo {
        channel_count,
        bytes_per_channel,
        bytes_per_pixel,
        signed: matches!(
            kind,
            ChannelKind::Snorm | ChannelKind::SignedInt | ChannelKind::Half | ChannelKind::Float
        ),
        normalized: matches!(kind, ChannelKind::Unorm | ChannelKind::Snorm),
        kind,
        packed,
    })
}

// ---------------------------------------------------------------------------
// FormatError
// ---------------------------------------------------------------------------

/// Errors from format validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum FormatError {
    /// The pair is not in the format table.
    #[error("unsupported pixel format {}/{}", .order.name(), .data_type.name())]
    Unsupported {
        order: ChannelOrder,
        data_type: ChannelDataType,
    },
}

// ---------------------------------------------------------------------------
// PixelFormat
// ---------------------------------------------------------------------------

/// A validated channel order and data type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat {
    order: ChannelOrder,
    data_type: ChannelDataType,
    info: FormatInfo,
}

impl PixelFormat {
    /// Validate a pair against the format table.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Unsupported`] if the pair is not in the table.
    pub const fn new(order: ChannelOrder, data_type: ChannelDataType) -> Result<Self, FormatError> {
        match lookup(order, data_type) {
            Some(info) => Ok(Self {
                order,
                data_type,
                info,
            }),
            None => Err(FormatError::Unsupported { order, data_type }),
        }
    }

    const fn known(order: ChannelOrder, data_type: ChannelDataType) -> Self {
        match Self::new(order, data_type) {
            Ok(format) => format,
            Err(_) => panic!("named format constant is missing from the format table"),
        }
    }

    // Named constants ---------------------------------------------------------

    pub const RGBA_UNORM_INT8: Self = Self::known(ChannelOrder::Rgba, ChannelDataType::UnormInt8);
    pub const RGBA_UNORM_INT16: Self =
        Self::known(ChannelOrder::Rgba, ChannelDataType::UnormInt16);
    pub const RGBA_FLOAT: Self = Self::known(ChannelOrder::Rgba, ChannelDataType::Float);
    pub const RGBA_HALF: Self = Self::known(ChannelOrder::Rgba, ChannelDataType::HalfFloat);
    pub const RGBA_SIGNED_INT32: Self =
        Self::known(ChannelOrder::Rgba, ChannelDataType::SignedInt32);
    pub const RGBA_UNSIGNED_INT8: Self =
        Self::known(ChannelOrder::Rgba, ChannelDataType::UnsignedInt8);
    pub const BGRA_UNORM_INT8: Self = Self::known(ChannelOrder::Bgra, ChannelDataType::UnormInt8);
    pub const R_FLOAT: Self = Self::known(ChannelOrder::R, ChannelDataType::Float);
    pub const R_UNORM_INT8: Self = Self::known(ChannelOrder::R, ChannelDataType::UnormInt8);
    pub const RGB_565: Self = Self::known(ChannelOrder::Rgb, ChannelDataType::UnormShort565);
    pub const SRGBA_UNORM_INT8: Self =
        Self::known(ChannelOrder::Srgba, ChannelDataType::UnormInt8);

    // Methods -----------------------------------------------------------------

    /// Every supported format, in table order.
    pub fn all() -> impl Iterator<Item = PixelFormat> {
        ChannelOrder::ALL.into_iter().flat_map(|order| {
            ChannelDataType::ALL
                .into_iter()
                .filter_map(move |data_type| Self::new(order, data_type).ok())
        })
    }

    /// Channel order half of the pair.
    #[inline]
    pub const fn order(self) -> ChannelOrder {
        self.order
    }

    /// Data type half of the pair.
    #[inline]
    pub const fn data_type(self) -> ChannelDataType {
        self.data_type
    }

    /// Table row for this format.
    #[inline]
    pub const fn info(self) -> FormatInfo {
        self.info
    }

    /// Stored size of one pixel.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        self.info.bytes_per_pixel as usize
    }

    /// Stored channel count, padding included.
    #[inline]
    pub const fn channel_count(self) -> usize {
        self.info.channel_count as usize
    }

    /// See [`ChannelOrder::has_alpha`].
    #[inline]
    pub const fn has_alpha(self) -> bool {
        self.order.has_alpha()
    }

    /// Integer formats are read and written as raw integers, not normalized.
    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(
            self.info.kind,
            ChannelKind::SignedInt | ChannelKind::UnsignedInt
        )
    }

    /// Compute a tight row pitch for the given width.
    #[inline]
    pub const fn row_bytes(self, width: usize) -> usize {
        width * self.bytes_per_pixel()
    }
}

impl fmt::Debug for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PixelFormat({self})")
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.order.name(), self.data_type.name())
    }
}
