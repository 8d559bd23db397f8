//! The N-dimensional image side of the bridge.
//!
//! [`NdSource`] is the contract an N-dimensional image must satisfy to be
//! exposed as a plane stack: an extent plus a typed element accessor.
//! Element writes are optional; the default is read-only. [`PlanarSource`]
//! marks storage that is already organized plane-by-plane, which is the
//! precondition for the zero-copy path.
//!
//! [`PlanarImage`] is the in-memory plane-organized implementation,
//! [`ComputedImage`] a virtual one that evaluates a function per coordinate.

use std::sync::{PoisonError, RwLock};

use crate::extent::{Extent, LayoutError, PlaneLayout};
use crate::pixel::Sample;
use crate::plane::{SharedPlane, StoredSample};

/// An N-dimensional image addressable by coordinate.
///
/// Coordinates follow the axis order of the extent (X, Y, then Channel, Z,
/// Time); `pos` must lie within the extent — accessors may panic otherwise,
/// like slice indexing.
pub trait NdSource: Send + Sync {
    /// Element type of this image.
    type Elem: Sample;

    /// Axis sizes of the image.
    fn extent(&self) -> &Extent;

    /// Read the element at `pos`.
    fn read(&self, pos: &[usize]) -> Self::Elem;

    /// Write the element at `pos`, returning whether the write took effect.
    ///
    /// Read-only sources keep the default, which drops the value and
    /// returns `false`.
    fn write(&self, _pos: &[usize], _value: Self::Elem) -> bool {
        false
    }

    /// Whether [`write`](Self::write) takes effect on this source.
    fn is_writable(&self) -> bool {
        false
    }
}

/// An [`NdSource`] whose storage is already a stack of 2-D planes.
///
/// `native_plane` hands out the image's own backing buffer — the handle the
/// zero-copy adapter shares with plane-stack consumers.
pub trait PlanarSource: NdSource {
    /// The backing buffer of one plane. No copy.
    fn native_plane(&self, index: usize) -> Option<SharedPlane<Self::Elem>>;
}

/// An in-memory N-dimensional image stored as a stack of shared planes.
///
/// Each plane slot holds a [`SharedPlane`]; handing a slot to a consumer
/// and mutating through either side touches the same memory. A slot can be
/// replaced wholesale ([`install_plane`](Self::install_plane)), which is
/// how a plane-stack consumer installs a new backing buffer.
pub struct PlanarImage<T> {
    extent: Extent,
    layout: PlaneLayout,
    planes: RwLock<Vec<SharedPlane<T>>>,
}

impl<T: StoredSample> PlanarImage<T> {
    /// Allocate a zero-filled image over `extent`.
    pub fn new(extent: Extent) -> Result<Self, LayoutError> {
        let layout = PlaneLayout::fold(&extent)?;
        let planes = (0..layout.plane_count())
            .map(|_| {
                SharedPlane::from_vec(
                    vec![T::default(); layout.plane_len()],
                    layout.width(),
                    layout.height(),
                )
            })
            .collect();
        Ok(Self {
            extent,
            layout,
            planes: RwLock::new(planes),
        })
    }

    /// Build an image over existing plane buffers.
    ///
    /// The planes are shared, not copied. Fails when the plane count or any
    /// plane's dimensions do not match the folded extent.
    pub fn from_planes(extent: Extent, planes: Vec<SharedPlane<T>>) -> Result<Self, LayoutError> {
        let layout = PlaneLayout::fold(&extent)?;
        if planes.len() != layout.plane_count()
            || planes
                .iter()
                .any(|p| p.width() != layout.width() || p.height() != layout.height())
        {
            return Err(LayoutError::PlaneShapeMismatch);
        }
        Ok(Self {
            extent,
            layout,
            planes: RwLock::new(planes),
        })
    }

    /// The plane layout folded from the extent.
    pub fn layout(&self) -> &PlaneLayout {
        &self.layout
    }

    /// Replace the backing buffer of one plane.
    ///
    /// Returns `false` without installing when the index is out of range or
    /// the dimensions do not match.
    pub fn install_plane(&self, index: usize, plane: SharedPlane<T>) -> bool {
        if plane.width() != self.layout.width() || plane.height() != self.layout.height() {
            return false;
        }
        let mut planes = self.planes.write().unwrap_or_else(PoisonError::into_inner);
        match planes.get_mut(index) {
            Some(slot) => {
                *slot = plane;
                true
            }
            None => false,
        }
    }

    fn plane_of(&self, pos: &[usize]) -> SharedPlane<T> {
        let c = pos.get(2).copied().unwrap_or(0);
        let z = pos.get(3).copied().unwrap_or(0);
        let t = pos.get(4).copied().unwrap_or(0);
        let index = self
            .layout
            .index_of(c, z, t)
            .unwrap_or_else(|| panic!("position {pos:?} outside extent"));
        let planes = self.planes.read().unwrap_or_else(PoisonError::into_inner);
        planes[index].clone()
    }
}

impl<T: StoredSample> NdSource for PlanarImage<T> {
    type Elem = T;

    fn extent(&self) -> &Extent {
        &self.extent
    }

    fn read(&self, pos: &[usize]) -> T {
        self.plane_of(pos).get(pos[0], pos[1])
    }

    fn write(&self, pos: &[usize], value: T) -> bool {
        self.plane_of(pos).set(pos[0], pos[1], value);
        true
    }

    fn is_writable(&self) -> bool {
        true
    }
}

impl<T: StoredSample> PlanarSource for PlanarImage<T> {
    fn native_plane(&self, index: usize) -> Option<SharedPlane<T>> {
        let planes = self.planes.read().unwrap_or_else(PoisonError::into_inner);
        planes.get(index).cloned()
    }
}

/// A virtual, read-only image computed per coordinate.
///
/// Useful for sources whose pixels do not live in process memory; every
/// [`read`](NdSource::read) evaluates the function.
pub struct ComputedImage<T, F> {
    extent: Extent,
    eval: F,
    _marker: core::marker::PhantomData<fn() -> T>,
}

impl<T, F> ComputedImage<T, F>
where
    T: Sample,
    F: Fn(&[usize]) -> T + Send + Sync,
{
    /// Build a computed image over `extent`.
    pub fn new(extent: Extent, eval: F) -> Self {
        Self {
            extent,
            eval,
            _marker: core::marker::PhantomData,
        }
    }
}

impl<T, F> NdSource for ComputedImage<T, F>
where
    T: Sample,
    F: Fn(&[usize]) -> T + Send + Sync,
{
    type Elem = T;

    fn extent(&self) -> &Extent {
        &self.extent
    }

    fn read(&self, pos: &[usize]) -> T {
        (self.eval)(pos)
    }
}
