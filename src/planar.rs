//! Zero-copy plane stack over plane-organized storage.
//!
//! When the source image already stores its pixels plane-by-plane in a
//! natively representable sample type, the stack hands out the image's own
//! buffers: both views observe and mutate the same memory, and a write
//! through one is immediately visible through the other. No cache, no
//! conversion.

use std::sync::Arc;

use crate::extent::PlaneLayout;
use crate::plane::{PlaneBuffer, StoredSample};
use crate::source::{PlanarImage, PlanarSource};
use crate::stack::{check_index, PlaneStack, StackError, WriteOutcome};

/// Zero-copy plane-stack view of a [`PlanarImage`].
///
/// Always writable in the sense that the buffers *are* the storage —
/// mutating a fetched plane mutates the image. `set_plane` therefore only
/// has work to do when the caller supplies a different buffer, which is
/// installed as the new backing storage for that plane.
pub struct PlanarStack<T: StoredSample> {
    image: Arc<PlanarImage<T>>,
    layout: PlaneLayout,
}

impl<T: StoredSample> PlanarStack<T> {
    /// Wrap a plane-organized image. The image keeps ownership of its
    /// buffers; the stack shares them.
    pub fn wrap(image: Arc<PlanarImage<T>>) -> Self {
        let layout = *image.layout();
        Self { image, layout }
    }

    /// The wrapped image.
    pub fn image(&self) -> &Arc<PlanarImage<T>> {
        &self.image
    }

    /// The plane layout folded from the image's extent.
    pub fn layout(&self) -> &PlaneLayout {
        &self.layout
    }
}

impl<T: StoredSample> PlaneStack for PlanarStack<T> {
    fn width(&self) -> usize {
        self.layout.width()
    }

    fn height(&self) -> usize {
        self.layout.height()
    }

    fn plane_count(&self) -> usize {
        self.layout.plane_count()
    }

    fn bit_depth(&self) -> u32 {
        T::KIND.bit_depth()
    }

    fn plane(&self, index: usize) -> Result<PlaneBuffer, StackError> {
        check_index(index, self.layout.plane_count())?;
        let plane = self.image.native_plane(index).ok_or({
            StackError::IndexOutOfRange {
                index,
                plane_count: self.layout.plane_count(),
            }
        })?;
        Ok(T::buffer(plane))
    }

    fn set_plane(&self, index: usize, data: PlaneBuffer) -> Result<WriteOutcome, StackError> {
        check_index(index, self.layout.plane_count())?;
        // A buffer of the wrong kind is swallowed, not raised: legacy
        // consumers push data at every view unconditionally and rely on
        // read-only/unsupported targets staying silent.
        let Some(plane) = data.as_plane::<T>() else {
            return Ok(WriteOutcome::Ignored);
        };
        if let Some(existing) = self.image.native_plane(index)
            && existing.same_buffer(plane)
        {
            // Already the shared storage; the caller's edits are in place.
            return Ok(WriteOutcome::Ignored);
        }
        if self.image.install_plane(index, plane.clone()) {
            Ok(WriteOutcome::Written)
        } else {
            Ok(WriteOutcome::Ignored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extent::Extent;
    use crate::plane::SharedPlane;
    use crate::source::NdSource;

    fn image_3ch() -> Arc<PlanarImage<u16>> {
        let extent = Extent::new(&[4, 2, 3]).unwrap();
        Arc::new(PlanarImage::new(extent).unwrap())
    }

    #[test]
    fn dimensions_and_depth() {
        let stack = PlanarStack::wrap(image_3ch());
        assert_eq!(stack.width(), 4);
        assert_eq!(stack.height(), 2);
        assert_eq!(stack.plane_count(), 3);
        assert_eq!(stack.bit_depth(), 16);
    }

    #[test]
    fn round_trip_both_directions() {
        let image = image_3ch();
        let stack = PlanarStack::wrap(Arc::clone(&image));

        // Write through the stack view, read through the image.
        let buf = stack.plane(1).unwrap();
        buf.as_u16().unwrap().set(3, 1, 4096);
        assert_eq!(image.read(&[3, 1, 1]), 4096);

        // Write through the image, read through the stack view.
        assert!(image.write(&[0, 0, 1], 77));
        assert_eq!(buf.as_u16().unwrap().get(0, 0), 77);
    }

    #[test]
    fn setting_the_shared_buffer_is_ignored() {
        let stack = PlanarStack::wrap(image_3ch());
        let buf = stack.plane(0).unwrap();
        assert_eq!(stack.set_plane(0, buf).unwrap(), WriteOutcome::Ignored);
    }

    #[test]
    fn installing_a_new_buffer_writes() {
        let image = image_3ch();
        let stack = PlanarStack::wrap(Arc::clone(&image));
        let fresh = SharedPlane::from_vec(vec![42u16; 8], 4, 2);
        let outcome = stack
            .set_plane(2, PlaneBuffer::U16(fresh.clone()))
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(image.read(&[1, 1, 2]), 42);
        assert!(stack.plane(2).unwrap().as_u16().unwrap().same_buffer(&fresh));
    }

    #[test]
    fn wrong_kind_is_swallowed() {
        let image = image_3ch();
        let stack = PlanarStack::wrap(Arc::clone(&image));
        let wrong = PlaneBuffer::F32(SharedPlane::from_vec(vec![0.0; 8], 4, 2));
        assert_eq!(stack.set_plane(0, wrong).unwrap(), WriteOutcome::Ignored);
        assert_eq!(image.read(&[0, 0, 0]), 0);
    }

    #[test]
    fn wrong_shape_is_swallowed() {
        let stack = PlanarStack::wrap(image_3ch());
        let small = PlaneBuffer::U16(SharedPlane::from_vec(vec![1u16; 4], 2, 2));
        assert_eq!(stack.set_plane(0, small).unwrap(), WriteOutcome::Ignored);
    }

    #[test]
    fn out_of_range_is_an_error() {
        let stack = PlanarStack::wrap(image_3ch());
        assert!(matches!(
            stack.plane(3),
            Err(StackError::IndexOutOfRange { index: 3, .. })
        ));
        let buf = PlaneBuffer::U16(SharedPlane::from_vec(vec![0u16; 8], 4, 2));
        assert!(stack.set_plane(9, buf).is_err());
    }
}
