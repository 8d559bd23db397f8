//! Per-element converters for types without a native plane representation.
//!
//! Every converter is pure and stateless: calling it twice on equal inputs
//! yields bit-identical outputs. The inverse direction drives write-back —
//! a converter with no inverse makes `set_plane` an intentional no-op on
//! the adapter built over it. A type with neither a classification nor a
//! converter is rejected when the adapter is built, never per pixel.

use num_complex::Complex;
use rgb::alt::ARGB;
use rgb::Rgb;

use crate::pixel::Sample;

/// Luminance weights legacy consumers expect.
///
/// The blue weight is 0.144, not the textbook 0.114. Deliberate.
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.144;

/// Alpha-weighted luminance of a packed color value.
///
/// `alpha · (0.299·R + 0.587·G + 0.144·B)` with alpha as the raw byte
/// value (0–255), not normalized — an opaque pixel's luminance is 255
/// times the weighted sum. Legacy consumers expect this scale.
pub fn luminance(value: ARGB<u8>) -> f32 {
    let a = f32::from(value.a);
    a * (LUMA_R * f32::from(value.r) + LUMA_G * f32::from(value.g) + LUMA_B * f32::from(value.b))
}

/// A pure per-element conversion from source type `A` to plane type `B`.
///
/// `invert` is the write-back direction. For a lossy, one-directional
/// conversion it returns `None` for every input and
/// [`invertible`](Self::invertible) is `false`; adapters consult
/// `invertible` once instead of probing per pixel.
pub trait Converter<A, B>: Send + Sync {
    /// Convert one element.
    fn convert(&self, value: A) -> B;

    /// Translate a plane value back to the source type, `None` if one-way.
    fn invert(&self, value: B) -> Option<A>;

    /// Whether `invert` produces values (write-back is supported).
    fn invertible(&self) -> bool;
}

/// The do-nothing conversion for natively representable types.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl<T: Sample> Converter<T, T> for Identity {
    fn convert(&self, value: T) -> T {
        value
    }

    fn invert(&self, value: T) -> Option<T> {
        Some(value)
    }

    fn invertible(&self) -> bool {
        true
    }
}

/// Value-preserving copy of the real value into float-32.
///
/// The fallback for signed and wide integers and doubles. No clamping;
/// integers beyond float-32 precision lose low bits, which is accepted and
/// not separately signaled. Invertible exactly when the source type has an
/// inverse projection (not for complex or packed color).
#[derive(Clone, Copy, Debug, Default)]
pub struct RealToF32;

impl<T: Sample> Converter<T, f32> for RealToF32 {
    fn convert(&self, value: T) -> f32 {
        value.to_real()
    }

    fn invert(&self, value: f32) -> Option<T> {
        T::from_real(value)
    }

    fn invertible(&self) -> bool {
        T::HAS_INVERSE
    }
}

/// Clamp-and-scale a real value range onto `[0, 255]`.
#[derive(Clone, Copy, Debug)]
pub struct ClampToU8 {
    min: f32,
    max: f32,
}

impl ClampToU8 {
    /// Map `[min, max]` onto `[0, 255]`, clamping outside values.
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// The identity-like default range `[0, 255]`.
    pub fn full_range() -> Self {
        Self::new(0.0, 255.0)
    }

    /// The range for boolean masks: `[0, 1]` maps to `{0, 255}`.
    pub fn bit_range() -> Self {
        Self::new(0.0, 1.0)
    }
}

impl<T: Sample> Converter<T, u8> for ClampToU8 {
    fn convert(&self, value: T) -> u8 {
        let scaled = (value.to_real() - self.min) / (self.max - self.min) * 255.0;
        scaled.clamp(0.0, 255.0).round() as u8
    }

    fn invert(&self, value: u8) -> Option<T> {
        let real = f32::from(value) / 255.0 * (self.max - self.min) + self.min;
        T::from_real(real)
    }

    fn invertible(&self) -> bool {
        T::HAS_INVERSE
    }
}

/// Clamp-and-scale a real value range onto `[0, 65535]`.
#[derive(Clone, Copy, Debug)]
pub struct ClampToU16 {
    min: f32,
    max: f32,
}

impl ClampToU16 {
    /// Map `[min, max]` onto `[0, 65535]`, clamping outside values.
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// The identity-like default range `[0, 65535]`.
    pub fn full_range() -> Self {
        Self::new(0.0, 65535.0)
    }
}

impl<T: Sample> Converter<T, u16> for ClampToU16 {
    fn convert(&self, value: T) -> u16 {
        let scaled = (value.to_real() - self.min) / (self.max - self.min) * 65535.0;
        scaled.clamp(0.0, 65535.0).round() as u16
    }

    fn invert(&self, value: u16) -> Option<T> {
        let real = f32::from(value) / 65535.0 * (self.max - self.min) + self.min;
        T::from_real(real)
    }

    fn invertible(&self) -> bool {
        T::HAS_INVERSE
    }
}

/// Expand 3-component color to packed ARGB with fully opaque alpha.
///
/// The missing component defaults to the maximum representable value
/// (255); RGB passes through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct FillAlpha;

impl Converter<Rgb<u8>, ARGB<u8>> for FillAlpha {
    fn convert(&self, value: Rgb<u8>) -> ARGB<u8> {
        ARGB {
            a: 255,
            r: value.r,
            g: value.g,
            b: value.b,
        }
    }

    fn invert(&self, value: ARGB<u8>) -> Option<Rgb<u8>> {
        Some(Rgb {
            r: value.r,
            g: value.g,
            b: value.b,
        })
    }

    fn invertible(&self) -> bool {
        true
    }
}

/// Collapse packed color to a single float via alpha-weighted luminance.
///
/// One-way: the channel structure cannot be reconstructed.
#[derive(Clone, Copy, Debug, Default)]
pub struct Luminance;

impl Converter<ARGB<u8>, f32> for Luminance {
    fn convert(&self, value: ARGB<u8>) -> f32 {
        luminance(value)
    }

    fn invert(&self, _value: f32) -> Option<ARGB<u8>> {
        None
    }

    fn invertible(&self) -> bool {
        false
    }
}

/// Log-scaled power spectrum of a complex value, `ln(1 + |z|²)`.
///
/// One-way by nature: phase is discarded. Adapters built over this
/// conversion must ignore write-back, and do.
#[derive(Clone, Copy, Debug, Default)]
pub struct PowerSpectrum;

impl Converter<Complex<f32>, f32> for PowerSpectrum {
    fn convert(&self, value: Complex<f32>) -> f32 {
        value.norm_sqr().ln_1p()
    }

    fn invert(&self, _value: f32) -> Option<Complex<f32>> {
        None
    }

    fn invertible(&self) -> bool {
        false
    }
}

impl Converter<Complex<f64>, f32> for PowerSpectrum {
    fn convert(&self, value: Complex<f64>) -> f32 {
        value.norm_sqr().ln_1p() as f32
    }

    fn invert(&self, _value: f32) -> Option<Complex<f64>> {
        None
    }

    fn invertible(&self) -> bool {
        false
    }
}
