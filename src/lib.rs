//! Bridge between N-dimensional image arrays and flat 2-D plane stacks.
//!
//! An N-dimensional image (2 to 5 axes: X, Y, Channel, Z, Time) is exposed
//! as an ordered stack of same-sized 2-D planes, the shape that
//! slice-oriented image consumers expect:
//!
//! - [`Extent`] / [`PlaneLayout`] — axis sizes and the channel-fastest
//!   folding of the trailing axes into one plane index
//! - [`PixelType`] / [`StorageKind`] — pixel descriptors and the closed
//!   classification into the four plane storage kinds (u8, u16, packed
//!   ARGB, f32)
//! - [`PlaneBuffer`] / [`SharedPlane`] — reference-counted, lock-guarded
//!   plane storage over `imgref::ImgVec`
//! - [`NdSource`] / [`PlanarImage`] — the N-D array boundary and a
//!   plane-organized in-memory implementation of it
//! - [`Converter`] — pure per-element conversions, with optional inverses
//!   driving write-back
//! - [`PlaneStack`] — the consumer-facing stack contract, implemented
//!   zero-copy by [`PlanarStack`] and cached/converted by [`VirtualStack`]
//!
//! Two adapters cover the two source shapes. When the source stores its
//! planes natively, [`PlanarStack`] shares them directly and edits are
//! visible through both views at once. Everything else goes through
//! [`VirtualStack`]: planes are materialized on demand through a converter,
//! cached, and optionally written back through the converter's inverse.

#![forbid(unsafe_code)]

mod cache;
mod convert;
mod extent;
mod pixel;
mod planar;
mod plane;
mod source;
mod stack;
mod virtual_stack;

pub use cache::{PlaneCache, PlaneLoadError};
pub use convert::{
    luminance, ClampToU8, ClampToU16, Converter, FillAlpha, Identity, Luminance, PowerSpectrum,
    RealToF32,
};
pub use extent::{Extent, LayoutError, PlaneLayout};
pub use pixel::{Classification, PixelType, Sample, StorageKind};
pub use planar::PlanarStack;
pub use plane::{PlaneBuffer, SharedPlane, StoredSample, WeakPlane, WeakPlaneBuffer};
pub use source::{ComputedImage, NdSource, PlanarImage, PlanarSource};
pub use stack::{native_kind, BuildError, PlaneStack, StackError, WriteOutcome};
pub use virtual_stack::VirtualStack;

// Re-exports so adapter users can name plane and element types without
// depending on the underlying crates directly.
pub use imgref::{Img, ImgRef, ImgVec};
pub use num_complex::Complex;
pub use rgb::alt::ARGB;
pub use rgb::Rgb;
