//! Pixel type descriptors and storage classification.
//!
//! [`PixelType`] describes an element type (bit depth, signedness, component
//! count). [`PixelType::classify`] decides which of the four concrete plane
//! storage kinds represents it natively — a closed decision, with an
//! explicit [`Classification::Unsupported`] instead of an open-ended
//! dispatch. Unsupported types are never silently defaulted; the conversion
//! pipeline ([`Converter`](crate::Converter)) picks the fallback.

use num_complex::Complex;
use rgb::alt::ARGB;
use rgb::Rgb;

/// Descriptor of an element type of an N-dimensional image.
///
/// Determines at most one native plane storage kind. Types outside the
/// representable set (signed integers, unsigned wider than 16 bits, doubles,
/// complex) classify as unsupported and are converted, never stored directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelType {
    /// Native bit depth of one element (all components).
    pub bits: u16,
    /// Integer (`true`) or floating point (`false`).
    pub integer: bool,
    /// Whether the type is signed. Floating point types are signed.
    pub signed: bool,
    /// Components per element: 1 for scalars, 2 for complex, 4 for packed color.
    pub components: u8,
}

impl PixelType {
    /// 1-bit boolean mask.
    pub const BIT: Self = Self::unsigned_int(1);
    /// 8-bit unsigned integer.
    pub const U8: Self = Self::unsigned_int(8);
    /// 12-bit unsigned integer (stored in 16 bits).
    pub const U12: Self = Self::unsigned_int(12);
    /// 16-bit unsigned integer.
    pub const U16: Self = Self::unsigned_int(16);
    /// 32-bit unsigned integer.
    pub const U32: Self = Self::unsigned_int(32);
    /// 64-bit unsigned integer.
    pub const U64: Self = Self::unsigned_int(64);
    /// 8-bit signed integer.
    pub const I8: Self = Self::signed_int(8);
    /// 16-bit signed integer.
    pub const I16: Self = Self::signed_int(16);
    /// 32-bit signed integer.
    pub const I32: Self = Self::signed_int(32);
    /// 64-bit signed integer.
    pub const I64: Self = Self::signed_int(64);
    /// 32-bit float.
    pub const F32: Self = Self {
        bits: 32,
        integer: false,
        signed: true,
        components: 1,
    };
    /// 64-bit float.
    pub const F64: Self = Self {
        bits: 64,
        integer: false,
        signed: true,
        components: 1,
    };
    /// Packed 32-bit ARGB color.
    pub const ARGB: Self = Self {
        bits: 32,
        integer: true,
        signed: false,
        components: 4,
    };
    /// 3-component RGB color without alpha.
    ///
    /// Has no native plane representation; the usual fallback is
    /// [`FillAlpha`](crate::convert::FillAlpha) into ARGB.
    pub const RGB: Self = Self {
        bits: 24,
        integer: true,
        signed: false,
        components: 3,
    };
    /// Complex number with 32-bit float parts.
    pub const COMPLEX_F32: Self = Self {
        bits: 64,
        integer: false,
        signed: true,
        components: 2,
    };
    /// Complex number with 64-bit float parts.
    pub const COMPLEX_F64: Self = Self {
        bits: 128,
        integer: false,
        signed: true,
        components: 2,
    };

    const fn unsigned_int(bits: u16) -> Self {
        Self {
            bits,
            integer: true,
            signed: false,
            components: 1,
        }
    }

    const fn signed_int(bits: u16) -> Self {
        Self {
            bits,
            integer: true,
            signed: true,
            components: 1,
        }
    }

    /// Classify this type into its native plane storage kind.
    ///
    /// Pure and total: every descriptor classifies to exactly one
    /// [`Classification`]. Unsigned integers up to 8 bits are bytes, up to
    /// 16 bits are shorts,
    /// packed 4-component color is ARGB, 32-bit float scalars are floats.
    /// Everything else is unsupported here and falls back to float-32
    /// through a converter.
    pub const fn classify(self) -> Classification {
        if self.components == 4 && self.integer && self.bits == 32 {
            return Classification::Native(StorageKind::Argb);
        }
        if self.components == 1 {
            if self.integer && !self.signed {
                if self.bits <= 8 {
                    return Classification::Native(StorageKind::U8);
                }
                if self.bits <= 16 {
                    return Classification::Native(StorageKind::U16);
                }
            }
            if !self.integer && self.bits == 32 {
                return Classification::Native(StorageKind::F32);
            }
        }
        Classification::Unsupported(self)
    }
}

/// The four concrete plane storage kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Unsigned 8-bit samples.
    U8,
    /// Unsigned 16-bit samples.
    U16,
    /// Packed 32-bit ARGB color samples.
    Argb,
    /// 32-bit float samples.
    F32,
}

impl StorageKind {
    /// Consumer-visible bit depth of this storage kind.
    ///
    /// ARGB counts only the color bits (24), matching the plane-stack
    /// convention for packed RGB images.
    pub const fn bit_depth(self) -> u32 {
        match self {
            Self::U8 => 8,
            Self::U16 => 16,
            Self::Argb => 24,
            Self::F32 => 32,
        }
    }
}

impl core::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::Argb => "argb",
            Self::F32 => "f32",
        };
        f.write_str(name)
    }
}

/// Result of [`PixelType::classify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// The type has this native plane storage kind.
    Native(StorageKind),
    /// No native representation; carries the descriptor for error reporting.
    Unsupported(PixelType),
}

/// A typed element of an N-dimensional image.
///
/// `to_real` projects the element onto a single real value (the real part
/// for complex numbers, the alpha-weighted luminance for packed color).
/// `from_real` is the inverse where one exists; one-way types (complex,
/// packed color) return `None`, which makes the float fallback conversion
/// non-invertible and write-back a no-op.
pub trait Sample: Copy + Send + Sync + 'static {
    /// Descriptor of this element type.
    const PIXEL_TYPE: PixelType;

    /// Whether [`from_real`](Self::from_real) is defined for this type.
    ///
    /// Converters consult this to decide write-back support up front,
    /// at adapter construction rather than per pixel.
    const HAS_INVERSE: bool;

    /// Project onto a single real value.
    fn to_real(self) -> f32;

    /// Reconstruct from a real value, `None` for one-way types.
    fn from_real(value: f32) -> Option<Self>;
}

macro_rules! int_sample {
    ($($t:ty => $pt:expr),* $(,)?) => {
        $(impl Sample for $t {
            const PIXEL_TYPE: PixelType = $pt;
            const HAS_INVERSE: bool = true;

            fn to_real(self) -> f32 {
                self as f32
            }

            fn from_real(value: f32) -> Option<Self> {
                // Saturating float-to-int cast; NaN becomes 0.
                Some(value.round() as $t)
            }
        })*
    };
}

int_sample! {
    u8 => PixelType::U8,
    u16 => PixelType::U16,
    u32 => PixelType::U32,
    u64 => PixelType::U64,
    i8 => PixelType::I8,
    i16 => PixelType::I16,
    i32 => PixelType::I32,
    i64 => PixelType::I64,
}

impl Sample for bool {
    const PIXEL_TYPE: PixelType = PixelType::BIT;
    const HAS_INVERSE: bool = true;

    fn to_real(self) -> f32 {
        if self { 1.0 } else { 0.0 }
    }

    fn from_real(value: f32) -> Option<Self> {
        Some(value != 0.0)
    }
}

impl Sample for f32 {
    const PIXEL_TYPE: PixelType = PixelType::F32;
    const HAS_INVERSE: bool = true;

    fn to_real(self) -> f32 {
        self
    }

    fn from_real(value: f32) -> Option<Self> {
        Some(value)
    }
}

impl Sample for f64 {
    const PIXEL_TYPE: PixelType = PixelType::F64;
    const HAS_INVERSE: bool = true;

    fn to_real(self) -> f32 {
        self as f32
    }

    fn from_real(value: f32) -> Option<Self> {
        Some(value as f64)
    }
}

impl Sample for ARGB<u8> {
    const PIXEL_TYPE: PixelType = PixelType::ARGB;
    const HAS_INVERSE: bool = false;

    /// Alpha-weighted luminance, `alpha · (0.299·R + 0.587·G + 0.144·B)`
    /// with alpha as the raw byte value.
    ///
    /// The 0.144 blue weight (rather than the textbook 0.114) is what
    /// legacy consumers expect; see [`crate::convert::luminance`].
    fn to_real(self) -> f32 {
        crate::convert::luminance(self)
    }

    fn from_real(_value: f32) -> Option<Self> {
        None
    }
}

impl Sample for Rgb<u8> {
    const PIXEL_TYPE: PixelType = PixelType::RGB;
    const HAS_INVERSE: bool = false;

    /// Luminance with an implicit opaque alpha.
    fn to_real(self) -> f32 {
        crate::convert::luminance(rgb::alt::ARGB {
            a: 255,
            r: self.r,
            g: self.g,
            b: self.b,
        })
    }

    fn from_real(_value: f32) -> Option<Self> {
        None
    }
}

impl Sample for Complex<f32> {
    const PIXEL_TYPE: PixelType = PixelType::COMPLEX_F32;
    const HAS_INVERSE: bool = false;

    fn to_real(self) -> f32 {
        self.re
    }

    fn from_real(_value: f32) -> Option<Self> {
        None
    }
}

impl Sample for Complex<f64> {
    const PIXEL_TYPE: PixelType = PixelType::COMPLEX_F64;
    const HAS_INVERSE: bool = false;

    fn to_real(self) -> f32 {
        self.re as f32
    }

    fn from_real(_value: f32) -> Option<Self> {
        None
    }
}
