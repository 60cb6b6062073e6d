//! Flat, pointer-at-rest encoding for values crossing the ring.
//!
//! Encoding is two-pass. [`Marshal::measure`] sums the bytes a value needs
//! for out-of-line children without writing anything; [`Marshal::write`]
//! then fills a buffer of exactly that size and returns the value's `Ref`.
//! Strings and lists of primitives are referenced in place (zero copy), so
//! the source value must outlive every reader of the `Ref`.

use std::mem::size_of;

/// How a type is laid out relative to its `Ref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemKind {
    /// `Ref` is the value itself. Such types must have the layout of their
    /// `Ref` so lists of them can be referenced in place.
    Primitive,
    /// `Ref` points at the value's own storage.
    Wrapper,
    /// `Ref` points at child refs written into the flat buffer.
    Complex,
}

impl MemKind {
    /// Kind of a list whose elements are of this kind.
    pub const fn nest(self) -> Self {
        match self {
            MemKind::Primitive => MemKind::Wrapper,
            MemKind::Wrapper | MemKind::Complex => MemKind::Complex,
        }
    }

    pub const fn max(self, other: Self) -> Self {
        match (self, other) {
            (MemKind::Complex, _) | (_, MemKind::Complex) => MemKind::Complex,
            (MemKind::Wrapper, _) | (_, MemKind::Wrapper) => MemKind::Wrapper,
            _ => MemKind::Primitive,
        }
    }
}

/// Cursor into a buffer sized by [`Marshal::measure`].
pub struct Writer {
    ptr: *mut u8,
}

impl Writer {
    /// # Safety
    /// `ptr` must be valid for writes of every byte the following `write`
    /// calls produce.
    #[inline]
    pub unsafe fn new(ptr: *mut u8) -> Self {
        Writer { ptr }
    }

    /// # Safety
    /// Room for `T` must remain.
    #[inline]
    pub unsafe fn put<T>(&mut self, value: T) {
        self.ptr.cast::<T>().write_unaligned(value);
        self.ptr = self.ptr.add(size_of::<T>());
    }

    /// Split off `len` bytes for the caller and advance past them.
    ///
    /// # Safety
    /// Room for `len` bytes must remain.
    #[inline]
    pub unsafe fn reserve(&mut self, len: usize) -> Writer {
        let fork = Writer { ptr: self.ptr };
        self.ptr = self.ptr.add(len);
        fork
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.ptr as usize
    }
}

/// Address and element count. Addresses are plain integers so refs can sit
/// in shared memory and move between threads.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DataView {
    pub ptr: usize,
    pub len: usize,
}

#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListRef(pub DataView);

#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StringRef(pub DataView);

/// Owned encoding of one value with its `Ref` stored at the tail.
#[derive(Debug, Default)]
pub struct FlatBuffer {
    bytes: Vec<u8>,
    ref_offset: usize,
}

impl FlatBuffer {
    /// Address of the tail `Ref`: what a ring record carries.
    #[inline]
    pub fn ref_ptr(&self) -> usize {
        self.bytes.as_ptr() as usize + self.ref_offset
    }

    #[inline]
    pub fn ref_offset(&self) -> usize {
        self.ref_offset
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub trait Marshal {
    const KIND: MemKind;
    type Ref: Copy;

    /// Add this value's out-of-line bytes to `acc`, plus its own `Ref` when
    /// `include_self` (the value is a list element rather than a field).
    fn measure(&self, include_self: bool, acc: &mut usize);

    fn write(&self, writer: &mut Writer) -> Self::Ref;

    fn flat_size(&self) -> usize {
        let mut size = 0;
        self.measure(false, &mut size);
        size
    }

    /// Encode into a fresh buffer: children first, `Ref` last.
    fn to_flat(&self) -> FlatBuffer {
        let body = self.flat_size();
        let total = body + size_of::<Self::Ref>();
        let mut bytes = Vec::<u8>::with_capacity(total);
        unsafe {
            let base = bytes.as_mut_ptr();
            let mut writer = Writer::new(base);
            let r = self.write(&mut writer);
            debug_assert_eq!(writer.position(), base as usize + body);
            base.add(body).cast::<Self::Ref>().write_unaligned(r);
            bytes.set_len(total);
        }
        FlatBuffer {
            bytes,
            ref_offset: body,
        }
    }
}

pub trait Unmarshal: Sized {
    type Ref: Copy;

    /// # Safety
    /// Every address reachable from `r` must point at live memory produced
    /// by the matching [`Marshal`] encoding.
    unsafe fn read(r: &Self::Ref) -> Self;

    /// Decode from the address of a `Ref`, as carried by a ring record.
    ///
    /// # Safety
    /// As [`Unmarshal::read`], and `ptr` must address a `Ref`.
    unsafe fn read_at(ptr: usize) -> Self {
        let r = (ptr as *const Self::Ref).read_unaligned();
        Self::read(&r)
    }
}

macro_rules! primitive {
    ($($ty:ty),* $(,)?) => {$(
        impl Marshal for $ty {
            const KIND: MemKind = MemKind::Primitive;
            type Ref = $ty;

            #[inline]
            fn measure(&self, include_self: bool, acc: &mut usize) {
                if include_self {
                    *acc += size_of::<$ty>();
                }
            }

            #[inline]
            fn write(&self, _: &mut Writer) -> $ty {
                *self
            }
        }

        impl Unmarshal for $ty {
            type Ref = $ty;

            #[inline]
            unsafe fn read(r: &$ty) -> $ty {
                *r
            }
        }
    )*};
}

primitive!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64, bool, ());

impl Marshal for String {
    const KIND: MemKind = MemKind::Wrapper;
    type Ref = StringRef;

    #[inline]
    fn measure(&self, include_self: bool, acc: &mut usize) {
        if include_self {
            *acc += size_of::<StringRef>();
        }
    }

    #[inline]
    fn write(&self, _: &mut Writer) -> StringRef {
        StringRef(DataView {
            ptr: self.as_ptr() as usize,
            len: self.len(),
        })
    }
}

impl Unmarshal for String {
    type Ref = StringRef;

    unsafe fn read(r: &StringRef) -> String {
        if r.0.len == 0 {
            return String::new();
        }
        let bytes = std::slice::from_raw_parts(r.0.ptr as *const u8, r.0.len);
        String::from_utf8_lossy(bytes).into_owned()
    }
}

impl<T: Marshal> Marshal for Vec<T> {
    const KIND: MemKind = T::KIND.nest();
    type Ref = ListRef;

    fn measure(&self, include_self: bool, acc: &mut usize) {
        if include_self {
            *acc += size_of::<ListRef>();
        }
        if matches!(Self::KIND, MemKind::Complex) {
            self.iter().for_each(|elem| elem.measure(true, acc));
        }
    }

    fn write(&self, writer: &mut Writer) -> ListRef {
        if !matches!(Self::KIND, MemKind::Complex) {
            return ListRef(DataView {
                ptr: self.as_ptr() as usize,
                len: self.len(),
            });
        }

        let ptr = writer.position();
        unsafe {
            let mut children = writer.reserve(self.len() * size_of::<T::Ref>());
            for elem in self {
                let r = elem.write(writer);
                children.put(r);
            }
        }
        ListRef(DataView {
            ptr,
            len: self.len(),
        })
    }
}

impl<T: Unmarshal> Unmarshal for Vec<T> {
    type Ref = ListRef;

    unsafe fn read(r: &ListRef) -> Vec<T> {
        let base = r.0.ptr as *const T::Ref;
        (0..r.0.len)
            .map(|i| T::read(&base.add(i).read_unaligned()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_compose() {
        assert_eq!(<Vec<u32>>::KIND, MemKind::Wrapper);
        assert_eq!(<Vec<String>>::KIND, MemKind::Complex);
        assert_eq!(MemKind::Primitive.max(MemKind::Wrapper), MemKind::Wrapper);
        assert_eq!(MemKind::Wrapper.max(MemKind::Complex), MemKind::Complex);
    }

    #[test]
    fn primitive_list_is_zero_copy() {
        let v = vec![1u32, 2, 3];
        let flat = v.to_flat();
        assert_eq!(flat.ref_offset(), 0);
        assert_eq!(flat.len(), size_of::<ListRef>());
        let r = unsafe { (flat.ref_ptr() as *const ListRef).read_unaligned() };
        assert_eq!(r.0.ptr, v.as_ptr() as usize);
        assert_eq!(unsafe { Vec::<u32>::read_at(flat.ref_ptr()) }, v);
    }

    #[test]
    fn nested_lists_are_sized_exactly() {
        let v = vec![
            vec!["a".to_string(), "bc".to_string()],
            vec![],
            vec!["def".to_string()],
        ];
        let flat = v.to_flat();
        // 3 inner list refs, then 3 string refs
        let expected = 3 * size_of::<ListRef>() + 3 * size_of::<StringRef>();
        assert_eq!(flat.ref_offset(), expected);
        let back = unsafe { Vec::<Vec<String>>::read_at(flat.ref_ptr()) };
        assert_eq!(back, v);
    }

    #[test]
    fn empty_string_reads_back() {
        let s = String::new();
        let flat = s.to_flat();
        assert_eq!(unsafe { String::read_at(flat.ref_ptr()) }, "");
    }
}
