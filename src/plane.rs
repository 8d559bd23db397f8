//! Shared 2-D plane buffers.
//!
//! A plane is one width×height slice of pixel data, held in an
//! `imgref::ImgVec` behind an `Arc<RwLock<…>>`. The reference count makes
//! the "same memory seen from two views" relationship explicit: an
//! N-dimensional image and a plane stack wrapped around it hold clones of
//! the same [`SharedPlane`], and the buffer lives as long as the longer of
//! the two. [`PlaneBuffer`] is the closed enum over the four storage kinds
//! a plane can have.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use imgref::ImgVec;
use rgb::alt::ARGB;

use crate::pixel::{Sample, StorageKind};

/// A reference-counted, lockable 2-D pixel buffer.
///
/// Cloning is cheap and yields a handle to the *same* memory; use
/// [`same_buffer`](Self::same_buffer) to test identity. Dimensions are fixed
/// for the lifetime of the buffer and readable without taking the lock.
pub struct SharedPlane<T> {
    data: Arc<RwLock<ImgVec<T>>>,
    width: usize,
    height: usize,
}

impl<T> Clone for SharedPlane<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            width: self.width,
            height: self.height,
        }
    }
}

impl<T> SharedPlane<T> {
    /// Wrap an owned image buffer.
    pub fn new(img: ImgVec<T>) -> Self {
        let (width, height) = (img.width(), img.height());
        Self {
            data: Arc::new(RwLock::new(img)),
            width,
            height,
        }
    }

    /// Wrap a row-major pixel vector of length `width · height`.
    pub fn from_vec(pixels: Vec<T>, width: usize, height: usize) -> Self {
        Self::new(ImgVec::new(pixels, width, height))
    }

    /// Plane width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Plane height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixels per plane.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Whether the plane has zero pixels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `self` and `other` are handles to the same memory.
    pub fn same_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Lock the plane for reading.
    ///
    /// A poisoned lock is recovered rather than propagated — a panicking
    /// writer leaves pixel data in whatever state it reached, which is the
    /// shared-mutable-buffer contract the caller already accepted.
    pub fn read(&self) -> RwLockReadGuard<'_, ImgVec<T>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the plane for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, ImgVec<T>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Downgrade to a weak handle that does not keep the buffer alive.
    pub fn downgrade(&self) -> WeakPlane<T> {
        WeakPlane {
            data: Arc::downgrade(&self.data),
            width: self.width,
            height: self.height,
        }
    }
}

impl<T: Copy> SharedPlane<T> {
    /// Read one pixel.
    pub fn get(&self, x: usize, y: usize) -> T {
        let img = self.read();
        img.buf()[y * img.stride() + x]
    }

    /// Write one pixel.
    pub fn set(&self, x: usize, y: usize, value: T) {
        let mut img = self.write();
        let stride = img.stride();
        img.buf_mut()[y * stride + x] = value;
    }
}

impl<T> core::fmt::Debug for SharedPlane<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SharedPlane({}x{})", self.width, self.height)
    }
}

/// Weak counterpart of [`SharedPlane`]; see [`SharedPlane::downgrade`].
pub struct WeakPlane<T> {
    data: Weak<RwLock<ImgVec<T>>>,
    width: usize,
    height: usize,
}

impl<T> Clone for WeakPlane<T> {
    fn clone(&self) -> Self {
        Self {
            data: Weak::clone(&self.data),
            width: self.width,
            height: self.height,
        }
    }
}

impl<T> WeakPlane<T> {
    /// Recover a strong handle if the buffer is still alive.
    pub fn upgrade(&self) -> Option<SharedPlane<T>> {
        self.data.upgrade().map(|data| SharedPlane {
            data,
            width: self.width,
            height: self.height,
        })
    }
}

/// A sample type with a native plane representation.
///
/// Exactly four implementors exist, one per [`StorageKind`]: `u8`, `u16`,
/// `ARGB<u8>` and `f32`. The trait carries the typed plumbing between
/// `SharedPlane<Self>` and the [`PlaneBuffer`] enum.
pub trait StoredSample: Sample + Default {
    /// The storage kind this sample type backs.
    const KIND: StorageKind;

    /// Wrap a typed plane into the [`PlaneBuffer`] enum.
    fn buffer(plane: SharedPlane<Self>) -> PlaneBuffer;

    /// Borrow the typed plane out of a buffer of matching kind.
    fn from_buffer(buffer: &PlaneBuffer) -> Option<&SharedPlane<Self>>;
}

impl StoredSample for u8 {
    const KIND: StorageKind = StorageKind::U8;

    fn buffer(plane: SharedPlane<Self>) -> PlaneBuffer {
        PlaneBuffer::U8(plane)
    }

    fn from_buffer(buffer: &PlaneBuffer) -> Option<&SharedPlane<Self>> {
        match buffer {
            PlaneBuffer::U8(plane) => Some(plane),
            _ => None,
        }
    }
}

impl StoredSample for u16 {
    const KIND: StorageKind = StorageKind::U16;

    fn buffer(plane: SharedPlane<Self>) -> PlaneBuffer {
        PlaneBuffer::U16(plane)
    }

    fn from_buffer(buffer: &PlaneBuffer) -> Option<&SharedPlane<Self>> {
        match buffer {
            PlaneBuffer::U16(plane) => Some(plane),
            _ => None,
        }
    }
}

impl StoredSample for ARGB<u8> {
    const KIND: StorageKind = StorageKind::Argb;

    fn buffer(plane: SharedPlane<Self>) -> PlaneBuffer {
        PlaneBuffer::Argb(plane)
    }

    fn from_buffer(buffer: &PlaneBuffer) -> Option<&SharedPlane<Self>> {
        match buffer {
            PlaneBuffer::Argb(plane) => Some(plane),
            _ => None,
        }
    }
}

impl StoredSample for f32 {
    const KIND: StorageKind = StorageKind::F32;

    fn buffer(plane: SharedPlane<Self>) -> PlaneBuffer {
        PlaneBuffer::F32(plane)
    }

    fn from_buffer(buffer: &PlaneBuffer) -> Option<&SharedPlane<Self>> {
        match buffer {
            PlaneBuffer::F32(plane) => Some(plane),
            _ => None,
        }
    }
}

/// One plane of pixel data in one of the four storage kinds.
///
/// The variant determines both the sample type and the consumer-visible
/// bit depth. Clones share the underlying memory; a consumer that needs an
/// independent copy takes a [`snapshot`](Self::snapshot).
#[derive(Clone)]
pub enum PlaneBuffer {
    /// Unsigned 8-bit samples.
    U8(SharedPlane<u8>),
    /// Unsigned 16-bit samples.
    U16(SharedPlane<u16>),
    /// Packed ARGB color samples.
    Argb(SharedPlane<ARGB<u8>>),
    /// 32-bit float samples.
    F32(SharedPlane<f32>),
}

impl PlaneBuffer {
    /// Storage kind of this plane.
    pub fn kind(&self) -> StorageKind {
        match self {
            Self::U8(_) => StorageKind::U8,
            Self::U16(_) => StorageKind::U16,
            Self::Argb(_) => StorageKind::Argb,
            Self::F32(_) => StorageKind::F32,
        }
    }

    /// Consumer-visible bit depth (8, 16, 24 or 32).
    pub fn bit_depth(&self) -> u32 {
        self.kind().bit_depth()
    }

    /// Plane width in pixels.
    pub fn width(&self) -> usize {
        match self {
            Self::U8(p) => p.width(),
            Self::U16(p) => p.width(),
            Self::Argb(p) => p.width(),
            Self::F32(p) => p.width(),
        }
    }

    /// Plane height in pixels.
    pub fn height(&self) -> usize {
        match self {
            Self::U8(p) => p.height(),
            Self::U16(p) => p.height(),
            Self::Argb(p) => p.height(),
            Self::F32(p) => p.height(),
        }
    }

    /// Pixels per plane.
    pub fn len(&self) -> usize {
        self.width() * self.height()
    }

    /// Whether the plane has zero pixels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the typed plane if `T` matches the stored kind.
    pub fn as_plane<T: StoredSample>(&self) -> Option<&SharedPlane<T>> {
        T::from_buffer(self)
    }

    /// Borrow the `u8` plane if that is the stored kind.
    pub fn as_u8(&self) -> Option<&SharedPlane<u8>> {
        self.as_plane()
    }

    /// Borrow the `u16` plane if that is the stored kind.
    pub fn as_u16(&self) -> Option<&SharedPlane<u16>> {
        self.as_plane()
    }

    /// Borrow the ARGB plane if that is the stored kind.
    pub fn as_argb(&self) -> Option<&SharedPlane<ARGB<u8>>> {
        self.as_plane()
    }

    /// Borrow the `f32` plane if that is the stored kind.
    pub fn as_f32(&self) -> Option<&SharedPlane<f32>> {
        self.as_plane()
    }

    /// Whether `self` and `other` are handles to the same memory.
    ///
    /// Always false across different storage kinds.
    pub fn same_buffer(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::U8(a), Self::U8(b)) => a.same_buffer(b),
            (Self::U16(a), Self::U16(b)) => a.same_buffer(b),
            (Self::Argb(a), Self::Argb(b)) => a.same_buffer(b),
            (Self::F32(a), Self::F32(b)) => a.same_buffer(b),
            _ => false,
        }
    }

    /// Copy out an owned, independent image buffer of matching kind.
    pub fn snapshot<T: StoredSample>(&self) -> Option<ImgVec<T>> {
        self.as_plane::<T>().map(|plane| plane.read().clone())
    }

    /// Downgrade to a weak handle that does not keep the buffer alive.
    pub fn downgrade(&self) -> WeakPlaneBuffer {
        match self {
            Self::U8(p) => WeakPlaneBuffer::U8(p.downgrade()),
            Self::U16(p) => WeakPlaneBuffer::U16(p.downgrade()),
            Self::Argb(p) => WeakPlaneBuffer::Argb(p.downgrade()),
            Self::F32(p) => WeakPlaneBuffer::F32(p.downgrade()),
        }
    }
}

impl core::fmt::Debug for PlaneBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "PlaneBuffer::{}({}x{})",
            match self {
                Self::U8(_) => "U8",
                Self::U16(_) => "U16",
                Self::Argb(_) => "Argb",
                Self::F32(_) => "F32",
            },
            self.width(),
            self.height()
        )
    }
}

/// Weak counterpart of [`PlaneBuffer`].
#[derive(Clone)]
pub enum WeakPlaneBuffer {
    /// Weak handle to a `u8` plane.
    U8(WeakPlane<u8>),
    /// Weak handle to a `u16` plane.
    U16(WeakPlane<u16>),
    /// Weak handle to an ARGB plane.
    Argb(WeakPlane<ARGB<u8>>),
    /// Weak handle to an `f32` plane.
    F32(WeakPlane<f32>),
}

impl WeakPlaneBuffer {
    /// Recover a strong handle if the buffer is still alive.
    pub fn upgrade(&self) -> Option<PlaneBuffer> {
        match self {
            Self::U8(p) => p.upgrade().map(PlaneBuffer::U8),
            Self::U16(p) => p.upgrade().map(PlaneBuffer::U16),
            Self::Argb(p) => p.upgrade().map(PlaneBuffer::Argb),
            Self::F32(p) => p.upgrade().map(PlaneBuffer::F32),
        }
    }
}
