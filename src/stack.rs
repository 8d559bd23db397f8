//! The plane-stack contract and its error taxonomy.
//!
//! A [`PlaneStack`] is the consumer-facing shape of the bridge: fixed
//! dimensions and bit depth, planes addressable by a single linear index,
//! and a `set_plane` that legacy consumers may call unconditionally on
//! every view. Whether a write actually took effect is *reported* through
//! [`WriteOutcome`], never raised — read-only views, one-way conversions
//! and already-shared buffers all answer [`WriteOutcome::Ignored`].

use crate::cache::PlaneLoadError;
use crate::extent::LayoutError;
use crate::pixel::{Classification, PixelType, StorageKind};
use crate::plane::PlaneBuffer;

/// A flat, ordered stack of addressable 2-D planes.
///
/// All dimensions are fixed at construction. Implementations are the
/// zero-copy [`PlanarStack`](crate::PlanarStack) and the cached
/// [`VirtualStack`](crate::VirtualStack).
pub trait PlaneStack: Send + Sync {
    /// Plane width in pixels.
    fn width(&self) -> usize;

    /// Plane height in pixels.
    fn height(&self) -> usize;

    /// Number of planes in the stack.
    fn plane_count(&self) -> usize;

    /// Consumer-visible bit depth (8, 16, 24 or 32).
    fn bit_depth(&self) -> u32;

    /// Fetch one plane.
    ///
    /// The returned buffer may be shared with the underlying storage (it is
    /// on the zero-copy path) — treat it as aliased unless snapshotted.
    fn plane(&self, index: usize) -> Result<PlaneBuffer, StackError>;

    /// Offer a plane of data for write-back.
    ///
    /// Out-of-range indices and mismatched buffer kinds on a writable path
    /// are errors; an unsupported write is not. Callers that care whether
    /// the write landed inspect the [`WriteOutcome`].
    fn set_plane(&self, index: usize, data: PlaneBuffer) -> Result<WriteOutcome, StackError>;
}

/// What became of a `set_plane` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "an ignored write may need handling"]
pub enum WriteOutcome {
    /// The data was written through to the source.
    Written,
    /// The write was deliberately ignored: the view is read-only, the
    /// conversion is one-way, or the buffer is already the shared storage.
    Ignored,
}

/// A per-call failure of a plane-stack operation.
///
/// None of these corrupt the stack; the adapter stays usable.
#[derive(Clone, Debug)]
pub enum StackError {
    /// Plane index outside `[0, plane_count)`.
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of planes in the stack.
        plane_count: usize,
    },
    /// The plane loader failed.
    Load(PlaneLoadError),
    /// A write-back buffer has the wrong storage kind.
    KindMismatch {
        /// Kind the stack stores.
        expected: StorageKind,
        /// Kind the caller supplied.
        found: StorageKind,
    },
    /// A write-back buffer has the wrong dimensions.
    ShapeMismatch {
        /// Expected width and height.
        expected: (usize, usize),
        /// Supplied width and height.
        found: (usize, usize),
    },
}

impl core::fmt::Display for StackError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::IndexOutOfRange { index, plane_count } => {
                write!(f, "plane index {index} outside 0..{plane_count}")
            }
            Self::Load(err) => write!(f, "{err}"),
            Self::KindMismatch { expected, found } => {
                write!(f, "expected a {expected} plane, got {found}")
            }
            Self::ShapeMismatch { expected, found } => write!(
                f,
                "expected a {}x{} plane, got {}x{}",
                expected.0, expected.1, found.0, found.1
            ),
        }
    }
}

impl core::error::Error for StackError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Load(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PlaneLoadError> for StackError {
    fn from(err: PlaneLoadError) -> Self {
        Self::Load(err)
    }
}

/// Adapter construction failed.
///
/// Fatal and raised before any adapter state exists — an adapter is never
/// partially built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildError {
    /// The extent cannot be folded into a plane stack.
    Layout(LayoutError),
    /// The source pixel type has no native storage kind and no converter
    /// was supplied.
    Unsupported(PixelType),
}

impl core::fmt::Display for BuildError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Layout(err) => write!(f, "{err}"),
            Self::Unsupported(pt) => write!(
                f,
                "pixel type ({} bits, {} components) has no plane representation and no converter",
                pt.bits, pt.components
            ),
        }
    }
}

impl core::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Layout(err) => Some(err),
            Self::Unsupported(_) => None,
        }
    }
}

impl From<LayoutError> for BuildError {
    fn from(err: LayoutError) -> Self {
        Self::Layout(err)
    }
}

/// Storage kind a pixel type aliases without conversion.
///
/// Callers planning a zero-copy wrap ask this first; an `Unsupported`
/// answer means the type needs a converted stack
/// ([`VirtualStack`](crate::VirtualStack)) instead.
pub fn native_kind(ty: PixelType) -> Result<StorageKind, BuildError> {
    match ty.classify() {
        Classification::Native(kind) => Ok(kind),
        Classification::Unsupported(ty) => Err(BuildError::Unsupported(ty)),
    }
}

/// Check a plane index against the stack bounds.
pub(crate) fn check_index(index: usize, plane_count: usize) -> Result<(), StackError> {
    if index < plane_count {
        Ok(())
    } else {
        Err(StackError::IndexOutOfRange { index, plane_count })
    }
}
