//! Cached, converting plane stack over any N-dimensional source.
//!
//! When the source is not plane-organized, or its element type has no
//! native plane representation, planes are materialized on demand: the
//! cache loader walks the `(channel, slice, frame)` slice element by
//! element through a [`Converter`] into a fresh plane of the target
//! storage kind. Materialized planes are retained by the [`PlaneCache`]
//! and reloaded after eviction.
//!
//! Adapters start read-only. [`set_writable`](VirtualStack::set_writable)
//! enables write-back once — mutations offered via `set_plane` are then
//! translated through the converter's inverse into the source's native
//! element type. Write-back over a one-way conversion stays an
//! intentional no-op, reported as [`WriteOutcome::Ignored`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use num_complex::Complex;
use rgb::alt::ARGB;

use crate::cache::{PlaneCache, PlaneLoadError};
use crate::convert::{ClampToU8, ClampToU16, Converter, Identity, Luminance, PowerSpectrum, RealToF32};
use crate::extent::PlaneLayout;
use crate::plane::{PlaneBuffer, SharedPlane, StoredSample};
use crate::source::NdSource;
use crate::stack::{check_index, BuildError, PlaneStack, StackError, WriteOutcome};

/// Cached/converted plane-stack view of an [`NdSource`].
///
/// `S` is the source image, `B` the plane sample type the converter
/// produces (one of the four [`StoredSample`] implementors).
pub struct VirtualStack<S: NdSource, B: StoredSample> {
    source: Arc<S>,
    layout: PlaneLayout,
    converter: Arc<dyn Converter<S::Elem, B>>,
    cache: PlaneCache,
    writable: AtomicBool,
}

impl<S, B> VirtualStack<S, B>
where
    S: NdSource + 'static,
    B: StoredSample,
{
    /// Build a stack over `source` with an explicit converter.
    ///
    /// Fails only when the extent cannot be folded; a partially built
    /// adapter never exists. The result is read-only until
    /// [`set_writable`](Self::set_writable).
    pub fn with_converter(
        source: Arc<S>,
        converter: Arc<dyn Converter<S::Elem, B>>,
    ) -> Result<Self, BuildError> {
        let layout = PlaneLayout::fold(source.extent())?;
        let loader_source = Arc::clone(&source);
        let loader_converter = Arc::clone(&converter);
        let cache = PlaneCache::new(move |index| {
            extract_plane(&*loader_source, &layout, &*loader_converter, index)
        });
        Ok(Self {
            source,
            layout,
            converter,
            cache,
            writable: AtomicBool::new(false),
        })
    }

    /// Bound the number of cached planes (LRU eviction beyond it).
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = self.cache.with_capacity(capacity);
        self
    }

    /// Enable write-back. One-way: the stack never reverts to read-only.
    ///
    /// Called after construction so that consumer initialization cannot
    /// trigger a redundant write-back of freshly converted planes.
    pub fn set_writable(&self) {
        self.writable.store(true, Ordering::SeqCst);
    }

    /// Whether `set_plane` currently writes through to the source.
    pub fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst) && self.write_back_supported()
    }

    /// Whether this stack could ever write back: the conversion has an
    /// inverse and the source accepts writes.
    pub fn write_back_supported(&self) -> bool {
        self.converter.invertible() && self.source.is_writable()
    }

    /// The source image.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// The plane layout folded from the source's extent.
    pub fn layout(&self) -> &PlaneLayout {
        &self.layout
    }

    /// The plane cache, for explicit eviction control.
    pub fn cache(&self) -> &PlaneCache {
        &self.cache
    }

    /// Materialize every plane.
    ///
    /// A throughput knob only: results are identical whether planes are
    /// loaded here, lazily, or concurrently.
    #[cfg(not(feature = "parallel"))]
    pub fn preload(&self) -> Result<(), StackError> {
        for index in 0..self.layout.plane_count() {
            self.cache.get(index)?;
        }
        Ok(())
    }

    /// Materialize every plane, converting planes in parallel.
    ///
    /// A throughput knob only: results are identical whether planes are
    /// loaded here, lazily, or concurrently.
    #[cfg(feature = "parallel")]
    pub fn preload(&self) -> Result<(), StackError> {
        use rayon::prelude::*;
        (0..self.layout.plane_count())
            .into_par_iter()
            .try_for_each(|index| self.cache.get(index).map(drop))
            .map_err(StackError::from)
    }

    fn write_back(&self, index: usize, plane: &SharedPlane<B>) -> Result<WriteOutcome, StackError> {
        if plane.width() != self.layout.width() || plane.height() != self.layout.height() {
            return Err(StackError::ShapeMismatch {
                expected: (self.layout.width(), self.layout.height()),
                found: (plane.width(), plane.height()),
            });
        }
        let (c, z, t) = match self.layout.position_of(index) {
            Some(pos) => pos,
            None => {
                return Err(StackError::IndexOutOfRange {
                    index,
                    plane_count: self.layout.plane_count(),
                })
            }
        };
        let mut pos = slice_position(self.source.extent().num_axes(), c, z, t);
        let img = plane.read();
        for y in 0..self.layout.height() {
            pos[1] = y;
            for x in 0..self.layout.width() {
                pos[0] = x;
                let value = img.buf()[y * img.stride() + x];
                if let Some(native) = self.converter.invert(value) {
                    self.source.write(&pos, native);
                }
            }
        }
        drop(img);
        // The cached plane predates this write; force a reload so the next
        // read observes the written values, even through stale handles.
        self.cache.invalidate(index);
        Ok(WriteOutcome::Written)
    }
}

impl<S> VirtualStack<S, f32>
where
    S: NdSource + 'static,
{
    /// Float-32 stack using the value-preserving real projection.
    ///
    /// The universal fallback: works for every element type; write-back is
    /// available exactly when the element type has an inverse projection.
    pub fn wrap_f32(source: Arc<S>) -> Result<Self, BuildError> {
        Self::with_converter(source, Arc::new(RealToF32))
    }
}

impl<S> VirtualStack<S, u8>
where
    S: NdSource + 'static,
{
    /// Unsigned-byte stack clamping real values to `[0, 255]`.
    pub fn wrap_u8(source: Arc<S>) -> Result<Self, BuildError> {
        Self::with_converter(source, Arc::new(ClampToU8::full_range()))
    }

    /// Unsigned-byte stack for boolean masks: `[0, 1]` maps to `{0, 255}`.
    pub fn wrap_bit(source: Arc<S>) -> Result<Self, BuildError> {
        Self::with_converter(source, Arc::new(ClampToU8::bit_range()))
    }
}

impl<S> VirtualStack<S, u16>
where
    S: NdSource + 'static,
{
    /// Unsigned-short stack clamping real values to `[0, 65535]`.
    pub fn wrap_u16(source: Arc<S>) -> Result<Self, BuildError> {
        Self::with_converter(source, Arc::new(ClampToU16::full_range()))
    }
}

impl<S> VirtualStack<S, ARGB<u8>>
where
    S: NdSource<Elem = ARGB<u8>> + 'static,
{
    /// Packed-color stack over an ARGB source, no conversion.
    pub fn wrap_argb(source: Arc<S>) -> Result<Self, BuildError> {
        Self::with_converter(source, Arc::new(Identity))
    }
}

impl<S> VirtualStack<S, f32>
where
    S: NdSource<Elem = ARGB<u8>> + 'static,
{
    /// Float stack collapsing packed color to alpha-weighted luminance.
    ///
    /// One-way; `set_plane` is always ignored.
    pub fn wrap_luminance(source: Arc<S>) -> Result<Self, BuildError> {
        Self::with_converter(source, Arc::new(Luminance))
    }
}

impl<S> VirtualStack<S, f32>
where
    S: NdSource<Elem = Complex<f32>> + 'static,
{
    /// Float stack showing the log-scaled power spectrum of a complex
    /// source. One-way; `set_plane` is always ignored.
    pub fn wrap_power_spectrum(source: Arc<S>) -> Result<Self, BuildError> {
        Self::with_converter(source, Arc::new(PowerSpectrum))
    }
}

impl<S, B> PlaneStack for VirtualStack<S, B>
where
    S: NdSource + 'static,
    B: StoredSample,
{
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
        B::KIND.bit_depth()
    }

    fn plane(&self, index: usize) -> Result<PlaneBuffer, StackError> {
        check_index(index, self.layout.plane_count())?;
        Ok(self.cache.get(index)?)
    }

    fn set_plane(&self, index: usize, data: PlaneBuffer) -> Result<WriteOutcome, StackError> {
        check_index(index, self.layout.plane_count())?;
        if !self.is_writable() {
            // Deliberate policy, not an oversight: legacy consumers write
            // on every view and rely on unsupported targets staying silent.
            return Ok(WriteOutcome::Ignored);
        }
        match data.as_plane::<B>() {
            Some(plane) => self.write_back(index, plane),
            None => Err(StackError::KindMismatch {
                expected: B::KIND,
                found: data.kind(),
            }),
        }
    }
}

impl<S: NdSource, B: StoredSample> core::fmt::Debug for VirtualStack<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "VirtualStack<{}>({}x{}x{})",
            B::KIND,
            self.layout.width(),
            self.layout.height(),
            self.layout.plane_count()
        )
    }
}

/// Coordinate vector for the top-left pixel of one slice.
fn slice_position(num_axes: usize, c: usize, z: usize, t: usize) -> Vec<usize> {
    let mut pos = vec![0usize; num_axes];
    for (axis, value) in [(2, c), (3, z), (4, t)] {
        if axis < num_axes {
            pos[axis] = value;
        }
    }
    pos
}

/// Materialize one plane of `source` through `converter`.
fn extract_plane<S, B>(
    source: &S,
    layout: &PlaneLayout,
    converter: &dyn Converter<S::Elem, B>,
    index: usize,
) -> Result<PlaneBuffer, PlaneLoadError>
where
    S: NdSource,
    B: StoredSample,
{
    let (c, z, t) = layout
        .position_of(index)
        .ok_or_else(|| PlaneLoadError::new(index, "plane index outside layout".to_string()))?;
    let mut pos = slice_position(source.extent().num_axes(), c, z, t);
    let mut pixels = Vec::with_capacity(layout.plane_len());
    for y in 0..layout.height() {
        pos[1] = y;
        for x in 0..layout.width() {
            pos[0] = x;
            pixels.push(converter.convert(source.read(&pos)));
        }
    }
    Ok(B::buffer(SharedPlane::from_vec(
        pixels,
        layout.width(),
        layout.height(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extent::Extent;
    use crate::pixel::Sample;
    use crate::source::{ComputedImage, PlanarImage};
    use std::sync::{PoisonError, RwLock};

    /// Writable in-memory source over an arbitrary sample type.
    struct FlatImage<T> {
        extent: Extent,
        layout: PlaneLayout,
        data: RwLock<Vec<T>>,
    }

    impl<T: Sample + Default> FlatImage<T> {
        fn new(extent: Extent) -> Self {
            let layout = PlaneLayout::fold(&extent).unwrap();
            let len = layout.plane_len() * layout.plane_count();
            Self {
                extent,
                layout,
                data: RwLock::new(vec![T::default(); len]),
            }
        }

        fn offset(&self, pos: &[usize]) -> usize {
            let c = pos.get(2).copied().unwrap_or(0);
            let z = pos.get(3).copied().unwrap_or(0);
            let t = pos.get(4).copied().unwrap_or(0);
            let plane = self.layout.index_of(c, z, t).unwrap();
            plane * self.layout.plane_len() + pos[1] * self.layout.width() + pos[0]
        }
    }

    impl<T: Sample + Default> NdSource for FlatImage<T> {
        type Elem = T;

        fn extent(&self) -> &Extent {
            &self.extent
        }

        fn read(&self, pos: &[usize]) -> T {
            let offset = self.offset(pos);
            self.data.read().unwrap_or_else(PoisonError::into_inner)[offset]
        }

        fn write(&self, pos: &[usize], value: T) -> bool {
            let offset = self.offset(pos);
            self.data.write().unwrap_or_else(PoisonError::into_inner)[offset] = value;
            true
        }

        fn is_writable(&self) -> bool {
            true
        }
    }

    #[test]
    fn dimensions_follow_the_fold() {
        let extent = Extent::new(&[4, 3, 2, 5]).unwrap();
        let source = Arc::new(PlanarImage::<u16>::new(extent).unwrap());
        let stack = VirtualStack::wrap_u16(source).unwrap();
        assert_eq!(stack.width(), 4);
        assert_eq!(stack.height(), 3);
        assert_eq!(stack.plane_count(), 10);
        assert_eq!(stack.bit_depth(), 16);
    }

    #[test]
    fn planes_are_converted_and_cached() {
        let extent = Extent::new(&[3, 2]).unwrap();
        let source = Arc::new(ComputedImage::new(extent, |pos: &[usize]| {
            (pos[0] as i32) - (pos[1] as i32) * 10
        }));
        let stack = VirtualStack::wrap_f32(source).unwrap();
        let plane = stack.plane(0).unwrap();
        let values = plane.snapshot::<f32>().unwrap();
        assert_eq!(values.buf(), &[0.0, 1.0, 2.0, -10.0, -9.0, -8.0]);
        // Second fetch hits the cache.
        assert!(stack.plane(0).unwrap().same_buffer(&plane));
    }

    #[test]
    fn plane_addressing_matches_the_fold() {
        let extent = Extent::new(&[1, 1, 2, 2]).unwrap();
        // Value identifies the (channel, slice) pair.
        let source = Arc::new(ComputedImage::new(extent, |pos: &[usize]| {
            (pos[2] + 10 * pos[3]) as u32
        }));
        let stack = VirtualStack::wrap_f32(source).unwrap();
        // plane 3 = channel 1, slice 1.
        let plane = stack.plane(3).unwrap();
        assert_eq!(plane.as_f32().unwrap().get(0, 0), 11.0);
    }

    #[test]
    fn read_only_until_enabled() {
        let extent = Extent::new(&[2, 2]).unwrap();
        let source = Arc::new(FlatImage::<i32>::new(extent));
        let stack = VirtualStack::wrap_f32(Arc::clone(&source)).unwrap();
        assert!(stack.write_back_supported());
        assert!(!stack.is_writable());

        let replacement = PlaneBuffer::F32(SharedPlane::from_vec(vec![5.0; 4], 2, 2));
        let outcome = stack.set_plane(0, replacement.clone()).unwrap();
        assert_eq!(outcome, WriteOutcome::Ignored);
        assert_eq!(source.read(&[0, 0]), 0);

        stack.set_writable();
        assert!(stack.is_writable());
        assert_eq!(stack.set_plane(0, replacement).unwrap(), WriteOutcome::Written);
        assert_eq!(source.read(&[1, 1]), 5);
    }

    #[test]
    fn write_back_refreshes_the_cache() {
        let extent = Extent::new(&[2, 2]).unwrap();
        let source = Arc::new(FlatImage::<i32>::new(extent));
        let stack = VirtualStack::wrap_f32(Arc::clone(&source)).unwrap();
        let before = stack.plane(0).unwrap();
        stack.set_writable();
        let data = PlaneBuffer::F32(SharedPlane::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2));
        stack.set_plane(0, data).unwrap();
        let after = stack.plane(0).unwrap();
        assert!(!after.same_buffer(&before));
        assert_eq!(after.snapshot::<f32>().unwrap().buf(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn lossy_conversion_ignores_writes() {
        let extent = Extent::new(&[2, 1]).unwrap();
        let source = Arc::new(FlatImage::<Complex<f32>>::new(extent));
        source.write(&[0, 0], Complex::new(3.0, 4.0));
        let stack = VirtualStack::wrap_power_spectrum(Arc::clone(&source)).unwrap();
        let plane = stack.plane(0).unwrap();
        assert!((plane.as_f32().unwrap().get(0, 0) - 26.0f32.ln()).abs() < 1e-6);

        stack.set_writable();
        assert!(!stack.is_writable());
        let data = PlaneBuffer::F32(SharedPlane::from_vec(vec![9.0, 9.0], 2, 1));
        // Rejected without raising; the source is untouched.
        assert_eq!(stack.set_plane(0, data).unwrap(), WriteOutcome::Ignored);
        assert_eq!(source.read(&[0, 0]), Complex::new(3.0, 4.0));
    }

    #[test]
    fn kind_mismatch_on_writable_path_is_reported() {
        let extent = Extent::new(&[2, 2]).unwrap();
        let source = Arc::new(FlatImage::<i32>::new(extent));
        let stack = VirtualStack::wrap_f32(source).unwrap();
        stack.set_writable();
        let wrong = PlaneBuffer::U8(SharedPlane::from_vec(vec![0u8; 4], 2, 2));
        assert!(matches!(
            stack.set_plane(0, wrong),
            Err(StackError::KindMismatch { .. })
        ));
        let small = PlaneBuffer::F32(SharedPlane::from_vec(vec![0.0; 2], 2, 1));
        assert!(matches!(
            stack.set_plane(0, small),
            Err(StackError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn clamp_write_back_round_trips() {
        let extent = Extent::new(&[2, 1]).unwrap();
        let source = Arc::new(FlatImage::<u16>::new(extent));
        let stack = VirtualStack::wrap_u16(Arc::clone(&source)).unwrap();
        stack.set_writable();
        let data = PlaneBuffer::U16(SharedPlane::from_vec(vec![12345, 60000], 2, 1));
        assert_eq!(stack.set_plane(0, data).unwrap(), WriteOutcome::Written);
        assert_eq!(source.read(&[0, 0]), 12345);
        assert_eq!(source.read(&[1, 0]), 60000);
    }

    #[test]
    fn out_of_range_plane() {
        let extent = Extent::new(&[2, 2, 3]).unwrap();
        let source = Arc::new(PlanarImage::<u8>::new(extent).unwrap());
        let stack = VirtualStack::wrap_u8(source).unwrap();
        assert!(matches!(
            stack.plane(3),
            Err(StackError::IndexOutOfRange { index: 3, plane_count: 3 })
        ));
    }

    #[test]
    fn concurrent_fetches_share_one_buffer_per_plane() {
        use rayon::prelude::*;
        let extent = Extent::new(&[2, 2, 4]).unwrap();
        let source = Arc::new(ComputedImage::new(extent, |pos: &[usize]| pos[2] as u32));
        let stack = VirtualStack::wrap_f32(source).unwrap();
        let planes: Vec<PlaneBuffer> = (0..16)
            .into_par_iter()
            .map(|i| stack.plane(i % 4).unwrap())
            .collect();
        for (i, plane) in planes.iter().enumerate() {
            assert!(plane.same_buffer(&planes[i % 4]));
            assert_eq!(plane.as_f32().unwrap().get(0, 0), (i % 4) as f32);
        }
    }

    #[test]
    fn preload_fills_the_cache() {
        let extent = Extent::new(&[2, 2, 4]).unwrap();
        let source = Arc::new(PlanarImage::<u8>::new(extent).unwrap());
        let stack = VirtualStack::wrap_u8(source).unwrap();
        stack.preload().unwrap();
        assert_eq!(stack.cache().len(), 4);
    }

    #[test]
    fn cache_capacity_bounds_retention() {
        let extent = Extent::new(&[2, 2, 6]).unwrap();
        let source = Arc::new(PlanarImage::<u8>::new(extent).unwrap());
        let stack = VirtualStack::wrap_u8(source).unwrap().with_cache_capacity(2);
        stack.preload().unwrap();
        assert!(stack.cache().len() <= 2);
    }

    #[test]
    fn bit_sources_map_to_full_byte_range() {
        let extent = Extent::new(&[2, 1]).unwrap();
        let source = Arc::new(ComputedImage::new(extent, |pos: &[usize]| pos[0] == 1));
        let stack = VirtualStack::wrap_bit(source).unwrap();
        let plane = stack.plane(0).unwrap();
        assert_eq!(plane.as_u8().unwrap().get(0, 0), 0);
        assert_eq!(plane.as_u8().unwrap().get(1, 0), 255);
    }

    #[test]
    fn alpha_fill_yields_opaque_pixels() {
        use crate::convert::FillAlpha;
        use rgb::Rgb;
        let extent = Extent::new(&[2, 1]).unwrap();
        let source = Arc::new(ComputedImage::new(extent, |pos: &[usize]| Rgb {
            r: pos[0] as u8,
            g: 20,
            b: 30,
        }));
        let stack = VirtualStack::with_converter(source, Arc::new(FillAlpha)).unwrap();
        assert_eq!(stack.bit_depth(), 24);
        let plane = stack.plane(0).unwrap();
        let px = plane.as_argb().unwrap().get(1, 0);
        assert_eq!((px.a, px.r, px.g, px.b), (255, 1, 20, 30));
    }

    #[test]
    fn luminance_stack_is_one_way() {
        let extent = Extent::new(&[1, 1]).unwrap();
        let source = Arc::new(ComputedImage::new(extent, |_: &[usize]| ARGB {
            a: 255,
            r: 0,
            g: 0,
            b: 255u8,
        }));
        let stack = VirtualStack::wrap_luminance(source).unwrap();
        assert!(!stack.write_back_supported());
        let plane = stack.plane(0).unwrap();
        assert_eq!(plane.as_f32().unwrap().get(0, 0), 255.0 * (0.144 * 255.0));
    }
}
