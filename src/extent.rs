//! Axis conventions and dimension folding.
//!
//! An N-dimensional image is exposed to plane-stack consumers as a flat
//! sequence of 2-D planes. [`Extent`] validates the axis sizes and
//! [`PlaneLayout`] is the fold: it maps the axes beyond X/Y — Channel, Z,
//! Time, in that fixed order — onto a single linear plane index and back.

/// Validated axis sizes of an N-dimensional image.
///
/// Axes 0 and 1 are spatial (X, Y) and always present. Axes 2, 3, 4 map to
/// Channel, Z and Time, each optional. A size-1 trailing axis is legal and
/// means "trivial"; it contributes nothing to the plane count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extent {
    sizes: Vec<usize>,
}

impl Extent {
    /// Minimum number of axes (X, Y).
    pub const MIN_AXES: usize = 2;
    /// Maximum number of axes (X, Y, Channel, Z, Time).
    pub const MAX_AXES: usize = 5;

    /// Validate axis sizes into an `Extent`.
    ///
    /// Requires 2 to 5 axes, every size ≥ 1.
    pub fn new(sizes: &[usize]) -> Result<Self, LayoutError> {
        if sizes.len() < Self::MIN_AXES {
            return Err(LayoutError::TooFewAxes { found: sizes.len() });
        }
        if sizes.len() > Self::MAX_AXES {
            return Err(LayoutError::TooManyAxes { found: sizes.len() });
        }
        if let Some(axis) = sizes.iter().position(|&s| s == 0) {
            return Err(LayoutError::ZeroAxis { axis });
        }
        Ok(Self {
            sizes: sizes.to_vec(),
        })
    }

    /// Number of axes, including trivial ones.
    pub fn num_axes(&self) -> usize {
        self.sizes.len()
    }

    /// Size of one axis; 1 for axes beyond [`num_axes`](Self::num_axes).
    ///
    /// Absent axes reading as 1 matches the convention that a missing
    /// Channel/Z/Time axis is a trivial one.
    pub fn size(&self, axis: usize) -> usize {
        self.sizes.get(axis).copied().unwrap_or(1)
    }

    /// All axis sizes in order.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Width (axis 0).
    pub fn width(&self) -> usize {
        self.sizes[0]
    }

    /// Height (axis 1).
    pub fn height(&self) -> usize {
        self.sizes[1]
    }
}

/// The fold of an [`Extent`] onto a linear stack of 2-D planes.
///
/// Plane indices run channel-fastest: index `i` addresses
/// `(channel, slice, frame)` with `i = c + channels·(z + slices·t)`.
/// [`index_of`](Self::index_of) and [`position_of`](Self::position_of) are
/// exact inverses of each other over the axis bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneLayout {
    width: usize,
    height: usize,
    channels: usize,
    slices: usize,
    frames: usize,
    plane_count: usize,
    plane_len: usize,
}

impl PlaneLayout {
    /// Fold an extent into a plane layout.
    ///
    /// Fails only when the plane count (product of the Channel, Z and Time
    /// sizes) or the pixels-per-plane product overflows `usize`. Those are
    /// construction-time errors; an adapter is never built over an
    /// unfoldable extent.
    pub fn fold(extent: &Extent) -> Result<Self, LayoutError> {
        let width = extent.width();
        let height = extent.height();
        let plane_len = width
            .checked_mul(height)
            .ok_or(LayoutError::PlaneSizeOverflow)?;
        let channels = extent.size(2);
        let slices = extent.size(3);
        let frames = extent.size(4);
        let plane_count = channels
            .checked_mul(slices)
            .and_then(|n| n.checked_mul(frames))
            .ok_or(LayoutError::PlaneCountOverflow)?;
        Ok(Self {
            width,
            height,
            channels,
            slices,
            frames,
            plane_count,
            plane_len,
        })
    }

    /// Plane width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Plane height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Channel axis size (1 if trivial).
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Z axis size (1 if trivial).
    pub fn slices(&self) -> usize {
        self.slices
    }

    /// Time axis size (1 if trivial).
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Number of planes in the stack.
    pub fn plane_count(&self) -> usize {
        self.plane_count
    }

    /// Pixels per plane.
    pub fn plane_len(&self) -> usize {
        self.plane_len
    }

    /// Linear plane index of `(channel, slice, frame)`, channel fastest.
    ///
    /// `None` when any coordinate is outside its axis.
    pub fn index_of(&self, channel: usize, slice: usize, frame: usize) -> Option<usize> {
        if channel >= self.channels || slice >= self.slices || frame >= self.frames {
            return None;
        }
        Some(channel + self.channels * (slice + self.slices * frame))
    }

    /// `(channel, slice, frame)` of a linear plane index.
    ///
    /// `None` when `index >= plane_count`.
    pub fn position_of(&self, index: usize) -> Option<(usize, usize, usize)> {
        if index >= self.plane_count {
            return None;
        }
        let channel = index % self.channels;
        let rest = index / self.channels;
        Some((channel, rest % self.slices, rest / self.slices))
    }
}

/// An extent cannot be folded into a plane stack.
///
/// These are fatal at adapter construction; no adapter is partially built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutError {
    /// Fewer than two axes — X and Y are mandatory.
    TooFewAxes {
        /// Number of axes supplied.
        found: usize,
    },
    /// More than five axes — only Channel, Z and Time follow X/Y.
    TooManyAxes {
        /// Number of axes supplied.
        found: usize,
    },
    /// An axis has size zero.
    ZeroAxis {
        /// Index of the offending axis.
        axis: usize,
    },
    /// The plane count does not fit in `usize`.
    PlaneCountOverflow,
    /// The pixels-per-plane product does not fit in `usize`.
    PlaneSizeOverflow,
    /// Supplied plane buffers do not match the folded extent.
    PlaneShapeMismatch,
}

impl core::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TooFewAxes { found } => {
                write!(f, "{found} axes, at least 2 (X, Y) are required")
            }
            Self::TooManyAxes { found } => {
                write!(f, "{found} axes, at most 5 (X, Y, Channel, Z, Time) are supported")
            }
            Self::ZeroAxis { axis } => write!(f, "axis {axis} has size 0"),
            Self::PlaneCountOverflow => write!(f, "plane count overflows usize"),
            Self::PlaneSizeOverflow => write!(f, "plane size overflows usize"),
            Self::PlaneShapeMismatch => {
                write!(f, "plane buffers do not match the folded extent")
            }
        }
    }
}

impl core::error::Error for LayoutError {}
