//! Regions: the OS-backed (or upstream-allocator-backed) slabs that chunks
//! live inside, and the doubly-linked list threading them together so a
//! handle can walk every region it owns for `free_all`/`gc`/`Drop`.

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;

use allocator_api2::alloc::{AllocError, Allocator};

use crate::header::{align_up, ChunkHeader, RegionHeader, ALIGN, CHUNK_HEADER_SIZE, REGION_HEADER_SIZE};

/// The doubly-linked list of every region a handle currently owns.
///
/// Unordered: regions are pushed at the head on creation and unlinked from
/// wherever they sit on destruction. Nothing relies on list order.
pub(crate) struct RegionList {
    head: Cell<Option<NonNull<RegionHeader>>>,
}

impl RegionList {
    #[inline]
    pub const fn new() -> Self {
        RegionList { head: Cell::new(None) }
    }

    #[inline]
    pub fn head(&self) -> Option<NonNull<RegionHeader>> {
        self.head.get()
    }

    /// Detaches the whole list, returning its former head. Individual
    /// regions' own `prev`/`next` links are left untouched, so the caller
    /// can still walk the chain via [`RegionHeader::next`] while deciding
    /// which regions to re-add with [`push`](Self::push) and which to
    /// destroy, as `gc` does.
    #[inline]
    pub fn take_all(&self) -> Option<NonNull<RegionHeader>> {
        self.head.take()
    }

    /// # Safety
    ///
    /// `region` must not already be a member of this list.
    pub unsafe fn push(&self, region: NonNull<RegionHeader>) {
        // Safety: caller guarantees `region` is a fresh, unlinked region header.
        let r = unsafe { region.as_ref() };
        r.prev.set(None);
        r.next.set(self.head.get());
        if let Some(old_head) = self.head.get() {
            // Safety: list entries are live region headers.
            unsafe { old_head.as_ref() }.prev.set(Some(region));
        }
        self.head.set(Some(region));
    }

    /// # Safety
    ///
    /// `region` must currently be a member of this list.
    pub unsafe fn remove(&self, region: NonNull<RegionHeader>) {
        // Safety: caller guarantees `region` is a live list member.
        let r = unsafe { region.as_ref() };
        let prev = r.prev.get();
        let next = r.next.get();
        match prev {
            Some(prev) => unsafe { prev.as_ref() }.next.set(next),
            None => self.head.set(next),
        }
        if let Some(next) = next {
            unsafe { next.as_ref() }.prev.set(prev);
        }
    }

    /// Fixes up list links after `old` has moved to `new`'s address (as from
    /// a jumbo region's `grow`/`shrink`, which preserves header bytes across
    /// the move). `new`'s own `prev`/`next` are already correct, copied
    /// verbatim by the underlying allocator; only the neighbors' (or this
    /// list's head) pointers *to* the region need retargeting.
    ///
    /// # Safety
    ///
    /// `old` was a member of this list; `new` holds the same header bytes.
    pub unsafe fn relocate(&self, old: NonNull<RegionHeader>, new: NonNull<RegionHeader>) {
        let _ = old;
        // Safety: caller guarantees `new` carries `old`'s preserved header.
        let r = unsafe { new.as_ref() };
        match r.prev.get() {
            Some(prev) => unsafe { prev.as_ref() }.next.set(Some(new)),
            None => self.head.set(Some(new)),
        }
        if let Some(next) = r.next.get() {
            unsafe { next.as_ref() }.prev.set(Some(new));
        }
    }
}

#[inline]
pub(crate) fn region_layout(size: usize) -> Layout {
    // Safety: `size` is always already ALIGN-rounded by callers and ALIGN is
    // a valid power-of-two alignment.
    unsafe { Layout::from_size_align_unchecked(size, ALIGN) }
}

/// Total backing-allocation size for a jumbo region sized to fit exactly
/// one chunk of `data_size` usable bytes.
#[inline]
pub(crate) fn jumbo_region_size(data_size: usize) -> usize {
    REGION_HEADER_SIZE + CHUNK_HEADER_SIZE + align_up(data_size)
}

/// Usable data capacity of a jumbo region's sole chunk, read back from the
/// region's own backing-allocation size rather than the chunk's `len` field
/// (which a jumbo chunk leaves at 0, since its true size can exceed the
/// 29-bit field's range).
///
/// # Safety
///
/// `region` must be a live, jumbo region header.
#[inline]
pub(crate) unsafe fn jumbo_data_len(region: NonNull<RegionHeader>) -> usize {
    // Safety: caller guarantees `region` is a live region header.
    let size = unsafe { region.as_ref() }.size.get();
    size - REGION_HEADER_SIZE - CHUNK_HEADER_SIZE
}

/// Allocates a fresh region of `size` bytes from the upstream allocator and
/// writes its header, but does not link it into any [`RegionList`] or carve
/// its chunk space — callers do that once they decide where it belongs.
pub(crate) fn new_region<A: Allocator>(alloc: &A, size: usize) -> Result<NonNull<RegionHeader>, AllocError> {
    let layout = region_layout(size);
    let block = alloc.allocate(layout)?;
    let region: NonNull<RegionHeader> = block.cast();
    // Safety: `block` is freshly allocated, large enough for the header.
    let header = unsafe { region.as_ref() };
    header.prev.set(None);
    header.next.set(None);
    header.size.set(size);
    Ok(region)
}

/// Returns a region's backing memory to the upstream allocator.
///
/// # Safety
///
/// `region` must have been produced by [`new_region`] on this `alloc` and
/// must not be used afterward.
pub(crate) unsafe fn destroy_region<A: Allocator>(alloc: &A, region: NonNull<RegionHeader>) {
    // Safety: caller guarantees `region` is a live region from this allocator.
    let size = unsafe { region.as_ref() }.size.get();
    let layout = region_layout(size);
    // Safety: `region` was allocated with exactly `layout` by `new_region`.
    unsafe { alloc.deallocate(region.cast(), layout) };
}

/// The first chunk header in a region, immediately following the region
/// header.
#[inline]
pub(crate) fn first_chunk_of(region: NonNull<RegionHeader>) -> NonNull<ChunkHeader> {
    // Safety: every region reserves REGION_HEADER_SIZE bytes before its
    // first chunk.
    unsafe { NonNull::new_unchecked((region.as_ptr() as *mut u8).add(REGION_HEADER_SIZE).cast()) }
}

/// Recovers a region header from its first chunk.
///
/// # Safety
///
/// `first_chunk` must be the first chunk of its region (`prev_offset() ==
/// 0`).
#[inline]
pub(crate) unsafe fn region_of(first_chunk: NonNull<ChunkHeader>) -> NonNull<RegionHeader> {
    // Safety: caller guarantees `first_chunk` sits REGION_HEADER_SIZE past
    // its region's header.
    unsafe { NonNull::new_unchecked((first_chunk.as_ptr() as *mut u8).sub(REGION_HEADER_SIZE).cast()) }
}

/// Writes a single fresh, free, whole-region chunk header at the start of
/// `region`'s chunk space.
pub(crate) fn init_region_chunk(region: NonNull<RegionHeader>, region_size: usize) -> NonNull<ChunkHeader> {
    let chunk = first_chunk_of(region);
    // Safety: `chunk` is freshly carved space inside a region just allocated
    // by `new_region`.
    let header = unsafe { chunk.as_ref() };
    header.set_prev_offset(0);
    header.set_len(region_size - REGION_HEADER_SIZE);
    header.set_last(true);
    header.set_used(false);
    header.set_jumbo(false);
    chunk
}
