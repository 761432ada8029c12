#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(feature = "nightly", feature(allocator_api))]
#![warn(unsafe_op_in_unsafe_fn)]

#[cfg(feature = "alloc")]
extern crate alloc;

mod chunk;
mod header;
mod jumbo;
mod master;
mod recycler;
mod region;

use core::{
    cell::Cell,
    cmp::Ordering,
    hash::{Hash, Hasher},
    mem::ManuallyDrop,
    ptr::NonNull,
};

use allocator_api2::alloc::{AllocError, Allocator, Layout};

#[cfg(feature = "alloc")]
use allocator_api2::alloc::Global;

use crate::{
    chunk::{merge_free, split_free, split_used},
    header::{ChunkHeader, ALIGN, CHUNK_HEADER_SIZE, FREE_OVERLAY_SIZE, MAX_CHUNK_LEN, REGION_HEADER_SIZE},
    jumbo::{alloc_jumbo, free_jumbo, realloc_jumbo},
    master::Master,
    recycler::Recycler,
    region::{destroy_region, first_chunk_of, init_region_chunk, new_region, RegionList},
};

/// Default size of a normal region, in bytes: 8 MiB, a power of two.
pub const DEFAULT_REGION_SIZE: usize = 8 * 1024 * 1024;

// Two shapes of the same struct: with the `alloc` feature, `A` defaults to
// `Global` so `BlockAlloc<>` can be named bare; without it, there is no
// global allocator to default to and callers must always name `A`.
#[cfg(not(feature = "alloc"))]
macro_rules! block_alloc {
    ($(#[$meta:meta])* pub struct $block_alloc:ident;) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[must_use]
        pub struct $block_alloc<A: Allocator, const REGION_SIZE: usize = DEFAULT_REGION_SIZE> {
            inner: NonNull<Inner<A, REGION_SIZE>>,
        }
    };
}

#[cfg(feature = "alloc")]
macro_rules! block_alloc {
    ($(#[$meta:meta])* pub struct $block_alloc:ident;) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[must_use]
        pub struct $block_alloc<A: Allocator = Global, const REGION_SIZE: usize = DEFAULT_REGION_SIZE> {
            inner: NonNull<Inner<A, REGION_SIZE>>,
        }
    };
}

block_alloc! {
    /// A general-purpose region allocator for many small allocations of
    /// arbitrary size, backed by a small number of large regions drawn from
    /// an underlying [`Allocator`].
    ///
    /// Services `alloc`/`realloc`/`free` from two free lists: a LIFO
    /// "master" of never-recycled region space, and a circular "recycler"
    /// of previously freed space ordered by a self-adjusting rotation
    /// heuristic. Bulk reset (`free_all`) and region reclamation (`gc`) are
    /// also supported.
    ///
    /// `BlockAlloc` is a cheap, reference-counted handle: `Clone` shares the
    /// same underlying regions rather than creating an independent
    /// allocator, and the last clone dropped releases them. It is `!Sync`:
    /// this is a single-threaded-owner design with no internal
    /// synchronization, so thread safety is a caller concern, not this
    /// allocator's.
    ///
    /// `REGION_SIZE` is a const generic tunable (default
    /// [`DEFAULT_REGION_SIZE`], 8 MiB); it must be large enough to hold a
    /// region header, a chunk header, and one listable free chunk, or
    /// construction panics.
    pub struct BlockAlloc;
}

impl<A, const REGION_SIZE: usize> Clone for BlockAlloc<A, REGION_SIZE>
where
    A: Allocator,
{
    #[inline]
    fn clone(&self) -> Self {
        Inner::inc_ref(self.inner);
        BlockAlloc { inner: self.inner }
    }
}

impl<A, const REGION_SIZE: usize> PartialEq for BlockAlloc<A, REGION_SIZE>
where
    A: Allocator,
{
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<A, const REGION_SIZE: usize> Hash for BlockAlloc<A, REGION_SIZE>
where
    A: Allocator,
{
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl<A, const REGION_SIZE: usize> Drop for BlockAlloc<A, REGION_SIZE>
where
    A: Allocator,
{
    #[inline]
    fn drop(&mut self) {
        Inner::dec_ref(self.inner);
    }
}

#[cfg(feature = "alloc")]
#[cfg(not(no_global_oom_handling))]
impl<const REGION_SIZE: usize> BlockAlloc<Global, REGION_SIZE> {
    /// Returns a new [`BlockAlloc`] backed by the [`Global`] allocator.
    #[inline]
    pub fn new() -> Self {
        BlockAlloc { inner: Inner::new_in(Global) }
    }
}

#[cfg(feature = "alloc")]
#[cfg(not(no_global_oom_handling))]
impl<const REGION_SIZE: usize> Default for BlockAlloc<Global, REGION_SIZE> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<A, const REGION_SIZE: usize> BlockAlloc<A, REGION_SIZE>
where
    A: Allocator,
{
    /// Returns a new [`BlockAlloc`] backed by `allocator`, aborting on OOM.
    #[cfg(not(no_global_oom_handling))]
    #[inline]
    pub fn new_in(allocator: A) -> Self {
        BlockAlloc { inner: Inner::new_in(allocator) }
    }

    /// Attempts to create a new [`BlockAlloc`] backed by `allocator`.
    #[inline]
    pub fn try_new_in(allocator: A) -> Result<Self, AllocError> {
        Ok(BlockAlloc { inner: Inner::try_new_in(allocator)? })
    }

    /// Returns a pointer to at least `size` usable, `ALIGN`-aligned bytes.
    /// Aborts the process on allocator-level out-of-memory, matching the
    /// upstream assumption that the raw allocator essentially never fails.
    #[cfg(not(no_global_oom_handling))]
    #[inline]
    pub fn alloc(&self, size: usize) -> NonNull<u8> {
        match self.try_alloc(size) {
            Ok(ptr) => ptr,
            Err(AllocError) => handle_alloc_error(size),
        }
    }

    /// Fallible form of [`alloc`](Self::alloc).
    #[inline]
    pub fn try_alloc(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        // Safety: `self.inner` is a live `Inner` for as long as this handle exists.
        unsafe { self.inner.as_ref() }.alloc(size)
    }

    /// Releases a prior allocation. `ptr` must have been returned by
    /// [`alloc`](Self::alloc)/[`try_alloc`](Self::try_alloc)/
    /// [`realloc`](Self::realloc) on this same handle (or a clone of it)
    /// and not already freed.
    ///
    /// # Safety
    ///
    /// `ptr` must denote memory currently allocated by this allocator.
    #[inline]
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        // Safety: caller guarantees `ptr` is a live allocation of this allocator.
        unsafe { self.inner.as_ref() }.free(ptr);
    }

    /// Resizes a prior allocation to `size` bytes, preserving the first
    /// `min(old, size)` bytes of content. May return a different pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must denote memory currently allocated by this allocator.
    #[cfg(not(no_global_oom_handling))]
    #[inline]
    pub unsafe fn realloc(&self, ptr: NonNull<u8>, size: usize) -> NonNull<u8> {
        // Safety: caller guarantees `ptr` is a live allocation of this allocator.
        match unsafe { self.try_realloc(ptr, size) } {
            Ok(ptr) => ptr,
            Err(AllocError) => handle_alloc_error(size),
        }
    }

    /// Fallible form of [`realloc`](Self::realloc).
    ///
    /// # Safety
    ///
    /// `ptr` must denote memory currently allocated by this allocator.
    #[inline]
    pub unsafe fn try_realloc(&self, ptr: NonNull<u8>, size: usize) -> Result<NonNull<u8>, AllocError> {
        // Safety: caller guarantees `ptr` is a live allocation of this allocator.
        unsafe { self.inner.as_ref() }.realloc(ptr, size)
    }

    /// Logically frees every outstanding allocation from this handle; all
    /// prior pointers become invalid. Every normal region is reset to a
    /// single free chunk on the master list; jumbo regions are released.
    #[inline]
    pub fn free_all(&self) {
        // Safety: `self.inner` is a live `Inner`.
        unsafe { self.inner.as_ref() }.free_all();
    }

    /// Returns fully-unused regions to the underlying allocator. Does not
    /// invalidate any live pointer; regions still hosting a live allocation
    /// (or jumbo regions, which are in use by definition) are kept.
    #[inline]
    pub fn gc(&self) {
        // Safety: `self.inner` is a live `Inner`.
        unsafe { self.inner.as_ref() }.gc();
    }

    /// Releases all regions and this handle. Must be preceded by
    /// [`free_all`](Self::free_all), or called with no outstanding
    /// allocations. Equivalent to, and implemented by, dropping the handle
    /// (or the last clone of it) — this method exists only to spell out the
    /// external-interface contract by name.
    #[inline]
    pub fn cleanup(self) {}
}

unsafe impl<A, const REGION_SIZE: usize> Allocator for BlockAlloc<A, REGION_SIZE>
where
    A: Allocator,
{
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(
            layout.align() <= ALIGN,
            "BlockAlloc guarantees only ALIGN-byte ({ALIGN}) alignment"
        );
        let ptr = self.try_alloc(layout.size())?;
        Ok(NonNull::new(core::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), layout.size())).unwrap())
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        // Safety: covered by `Allocator::deallocate`'s contract.
        unsafe { self.free(ptr) };
    }

    #[inline]
    unsafe fn grow(&self, ptr: NonNull<u8>, _old_layout: Layout, new_layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(new_layout.align() <= ALIGN);
        // Safety: covered by `Allocator::grow`'s contract.
        let ptr = unsafe { self.try_realloc(ptr, new_layout.size()) }?;
        Ok(NonNull::new(core::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), new_layout.size())).unwrap())
    }

    #[inline]
    unsafe fn grow_zeroed(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        // Safety: covered by `Allocator::grow_zeroed`'s contract.
        let grown = unsafe { self.grow(ptr, old_layout, new_layout) }?;
        let grown_ptr = grown.as_ptr() as *mut u8;
        // Safety: `grown` covers at least `new_layout.size()` bytes; the
        // tail past `old_layout.size()` is newly extended, uninitialized
        // space that `grow_zeroed`'s contract requires we zero.
        unsafe {
            grown_ptr
                .add(old_layout.size())
                .write_bytes(0, new_layout.size() - old_layout.size())
        };
        Ok(grown)
    }

    #[inline]
    unsafe fn shrink(&self, ptr: NonNull<u8>, _old_layout: Layout, new_layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        // Safety: covered by `Allocator::shrink`'s contract.
        let ptr = unsafe { self.try_realloc(ptr, new_layout.size()) }?;
        Ok(NonNull::new(core::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), new_layout.size())).unwrap())
    }
}

/// A request exceeding this many usable bytes cannot fit in a normal
/// region and is routed to the jumbo path instead.
#[inline]
const fn max_normal_alloc(region_size: usize) -> usize {
    region_size - REGION_HEADER_SIZE - CHUNK_HEADER_SIZE
}

/// The heap-allocated state shared by every clone of a [`BlockAlloc`]
/// handle: the two free lists, the region list, the underlying allocator,
/// and a reference count. Lives behind a `NonNull<Inner<A, REGION_SIZE>>`
/// that every `BlockAlloc<A, REGION_SIZE>` clone points at.
struct Inner<A: Allocator, const REGION_SIZE: usize> {
    master: Master,
    recycler: Recycler,
    regions: RegionList,
    allocator: ManuallyDrop<A>,
    ref_cnt: Cell<usize>,
}

impl<A, const REGION_SIZE: usize> Inner<A, REGION_SIZE>
where
    A: Allocator,
{
    const MAX_NORMAL_ALLOC: usize = max_normal_alloc(REGION_SIZE);

    /// `true` iff `REGION_SIZE` is large enough to hold a region header, a
    /// chunk header, and one free chunk large enough to be listed, and small
    /// enough that a normal region's sole fresh chunk still fits the 29-bit
    /// `len` field. Checked in a `const` context so an invalid `REGION_SIZE`
    /// is a compile-time (or, failing that, a construction-time
    /// `debug_assert!`) error rather than a silent underflow/truncation
    /// somewhere in the allocator's arithmetic. Jumbo regions are exempt:
    /// their sole chunk leaves `len` at 0 rather than recording its true
    /// size there (see `region::jumbo_data_len`), so this bound is about
    /// normal regions only.
    const REGION_SIZE_IS_VALID: bool = {
        if REGION_SIZE < REGION_HEADER_SIZE + CHUNK_HEADER_SIZE + FREE_OVERLAY_SIZE {
            panic!("REGION_SIZE too small to hold a region header, a chunk header, and one free chunk");
        }
        if REGION_SIZE % ALIGN != 0 {
            panic!("REGION_SIZE must be a multiple of ALIGN");
        }
        if REGION_SIZE - REGION_HEADER_SIZE > MAX_CHUNK_LEN {
            panic!("REGION_SIZE too large: its sole free chunk's length would overflow the 29-bit len field");
        }
        true
    };

    fn try_new_in(allocator: A) -> Result<NonNull<Self>, AllocError> {
        debug_assert!(Self::REGION_SIZE_IS_VALID);

        let layout = Layout::new::<Self>();
        let ptr = allocator.allocate(layout)?.cast::<Self>();
        let inner = Inner {
            master: Master::new(),
            recycler: Recycler::new(),
            regions: RegionList::new(),
            allocator: ManuallyDrop::new(allocator),
            ref_cnt: Cell::new(1),
        };
        // Safety: `ptr` was just allocated to hold exactly `Self`.
        unsafe { core::ptr::write(ptr.as_ptr(), inner) };
        Ok(ptr)
    }

    #[cfg(not(no_global_oom_handling))]
    fn new_in(allocator: A) -> NonNull<Self> {
        match Self::try_new_in(allocator) {
            Ok(ptr) => ptr,
            Err(AllocError) => handle_alloc_error(core::mem::size_of::<Self>()),
        }
    }

    fn inc_ref(ptr: NonNull<Self>) {
        // Safety: `ptr` is a live `Inner`.
        let inner = unsafe { ptr.as_ref() };
        inner.ref_cnt.set(inner.ref_cnt.get() + 1);
    }

    fn dec_ref(ptr: NonNull<Self>) {
        // Safety: `ptr` is a live `Inner`.
        let inner = unsafe { ptr.as_ref() };
        debug_assert_ne!(inner.ref_cnt.get(), 0);
        let new_ref_cnt = inner.ref_cnt.get() - 1;
        inner.ref_cnt.set(new_ref_cnt);
        if new_ref_cnt == 0 {
            Self::destroy(ptr);
        }
    }

    /// Releases every region this handle owns (unconditionally, regardless
    /// of whether any chunk inside is still marked used — once the last
    /// handle is dropped there are by definition no more live references to
    /// hand such a pointer back through) and then the `Inner` struct
    /// itself. Backs both `Drop` and the public `cleanup` contract.
    #[cold]
    fn destroy(ptr: NonNull<Self>) {
        // Safety: `ptr` is a live `Inner` about to be torn down.
        let inner = unsafe { ptr.as_ref() };

        let mut cur = inner.regions.take_all();
        while let Some(region) = cur {
            // Safety: `region` is a live region header.
            let next = unsafe { region.as_ref() }.next.get();
            // Safety: every region on this list was created by `inner.allocator`.
            unsafe { destroy_region(&*inner.allocator, region) };
            cur = next;
        }

        // Safety: taking the allocator out of `ManuallyDrop`; the value is
        // dropped (and no longer touched through `inner`) immediately after.
        let allocator = unsafe { core::ptr::read(&*inner.allocator) };
        // Safety: `ptr` was allocated by `allocator` with `Layout::new::<Self>()`.
        unsafe { allocator.deallocate(ptr.cast(), Layout::new::<Self>()) };
    }

    /// Small requests are served from the recycler first, the
    /// master second (growing the region list if the master is empty),
    /// large requests are routed to the jumbo path.
    fn alloc(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        if size > Self::MAX_NORMAL_ALLOC {
            return alloc_jumbo(&*self.allocator, &self.regions, size);
        }

        let from_recycler = self
            .recycler
            .head()
            // Safety: the recycler only ever holds live, listable chunks.
            .filter(|&head| unsafe { head.as_ref() }.data_len() >= size);

        let selected = match from_recycler {
            Some(chunk) => chunk,
            None => loop {
                match self.master.head() {
                    // Safety: the master only ever holds live, listable chunks.
                    Some(head) if unsafe { head.as_ref() }.data_len() < size => {
                        // Safety: `head` is the current master head.
                        let evicted = unsafe { self.master.pop() }.unwrap();
                        // Safety: `evicted` is free and listable (it just
                        // came off the master) and no longer on any list.
                        unsafe { self.recycler.insert(evicted) };
                    }
                    Some(head) => break head,
                    None => {
                        let region = new_region(&*self.allocator, REGION_SIZE)?;
                        let chunk = init_region_chunk(region, REGION_SIZE);
                        // Safety: `region` is fresh and unlinked.
                        unsafe { self.regions.push(region) };
                        // Safety: `chunk` is free, listable (a whole fresh
                        // region always is, by `REGION_SIZE_IS_VALID`), and
                        // not on any list yet.
                        unsafe { self.master.push(chunk) };
                    }
                }
            },
        };

        // Safety: `selected` is free and is either the master or the
        // recycler head, per how it was chosen above.
        unsafe { split_free(&self.master, &self.recycler, selected, size) };

        if !self.recycler.is_empty() {
            // Safety: the recycler is non-empty.
            unsafe { self.recycler.cycle() };
        }

        // Safety: `selected` is a live chunk header.
        let header = unsafe { selected.as_ref() };
        header.set_used(true);
        Ok(NonNull::new(header.data_ptr()).unwrap())
    }

    /// Releases a chunk back to a free list, merging with free neighbors.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`alloc`](Self::alloc)/
    /// [`realloc`](Self::realloc) on this `Inner` and not already freed.
    unsafe fn free(&self, ptr: NonNull<u8>) {
        // Safety: caller guarantees `ptr` was returned by this allocator.
        let chunk = unsafe { ChunkHeader::from_data_ptr(ptr.as_ptr()) };
        // Safety: `chunk` is a live chunk header.
        let header = unsafe { chunk.as_ref() };
        debug_assert!(header.used(), "double free or foreign pointer passed to free");

        if header.jumbo() {
            // Safety: a jumbo chunk is the sole chunk of its region.
            unsafe { free_jumbo(&*self.allocator, &self.regions, chunk) };
            return;
        }

        header.set_used(false);
        // Safety: `chunk` just became free and is not yet on any free list.
        unsafe { merge_free(&self.master, &self.recycler, chunk) };
    }

    /// Resizes a chunk in place where possible, falling back to alloc+copy+free.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`alloc`](Self::alloc)/
    /// [`realloc`](Self::realloc) on this `Inner` and not already freed.
    unsafe fn realloc(&self, ptr: NonNull<u8>, size: usize) -> Result<NonNull<u8>, AllocError> {
        // Safety: caller guarantees `ptr` was returned by this allocator.
        let chunk = unsafe { ChunkHeader::from_data_ptr(ptr.as_ptr()) };
        // Safety: `chunk` is a live chunk header.
        let header = unsafe { chunk.as_ref() };
        debug_assert!(header.used(), "realloc of a freed or foreign pointer");

        if header.jumbo() {
            // Safety: a jumbo chunk is the sole chunk of its region.
            return unsafe { realloc_jumbo(&*self.allocator, &self.regions, chunk, size) };
        }

        let capacity = header.data_len();
        match size.cmp(&capacity) {
            Ordering::Equal => Ok(ptr),
            Ordering::Less => {
                // Safety: `chunk` is currently used.
                unsafe { split_used(&self.master, &self.recycler, chunk, size) };
                Ok(ptr)
            }
            Ordering::Greater => {
                // Safety: `chunk` is currently used and `size > capacity`.
                if unsafe { self.grow_in_place(chunk, size) } {
                    return Ok(ptr);
                }
                let new_ptr = self.alloc(size)?;
                // Safety: `ptr` has `capacity` live bytes; `new_ptr` has
                // room for at least `size >= capacity` bytes and does not
                // overlap `ptr` (it is either a different chunk or a fresh
                // jumbo region).
                unsafe { core::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), capacity) };
                // Safety: `ptr` is still a live allocation of this allocator.
                unsafe { self.free(ptr) };
                Ok(new_ptr)
            }
        }
    }

    /// Attempts to grow a used chunk in place by absorbing a free right
    /// neighbor. Returns whether it
    /// succeeded; on success `chunk`'s header has already been updated.
    ///
    /// # Safety
    ///
    /// `chunk` must currently be used and non-jumbo, with `size` exceeding
    /// its current data capacity.
    unsafe fn grow_in_place(&self, chunk: NonNull<ChunkHeader>, size: usize) -> bool {
        // Safety: caller guarantees `chunk` is a live, used chunk.
        let header = unsafe { chunk.as_ref() };
        let capacity = header.data_len();

        // Safety: `chunk` is a live chunk header.
        let right = match unsafe { header.next() } {
            Some(right) => right,
            None => return false,
        };
        // Safety: `right` is a live chunk header.
        let right_header = unsafe { right.as_ref() };
        if right_header.used() || capacity + right_header.len() < size {
            return false;
        }

        if right_header.listable() {
            // `split_extra` is how much of `right`'s own data we still need
            // after fully absorbing `chunk`'s current capacity and the
            // header `right` contributes; it floors to 0 (not underflows)
            // when the two exactly suffice, per the design notes.
            let split_extra = size.saturating_sub(capacity + CHUNK_HEADER_SIZE);
            // Safety: `right` is free and listed (master head or recycler member).
            unsafe { split_free(&self.master, &self.recycler, right, split_extra) };
        }
        // Else `right` is free but too small to ever have been listed
        // (merge-only); it carries no list membership to unlink.

        header.set_len(header.len() + right_header.len());
        header.set_last(right_header.last());
        if !header.last() {
            // Safety: there is a right neighbor since `header` isn't last.
            let new_right = unsafe { header.next() }.unwrap();
            // Safety: `new_right` is a live chunk header.
            unsafe { new_right.as_ref() }.set_prev_offset(header.len() as u32);
        }
        true
    }

    /// Nulls both free-list heads, then walks every
    /// region, releasing jumbo regions and resetting normal ones to a
    /// single free chunk pushed onto the master.
    fn free_all(&self) {
        self.master.clear();
        self.recycler.clear();

        let mut cur = self.regions.head();
        while let Some(region) = cur {
            // Safety: `region` is a live region header.
            let region_header = unsafe { region.as_ref() };
            let next = region_header.next.get();
            let chunk = first_chunk_of(region);
            // Safety: `chunk` is the first chunk of a live region.
            if unsafe { chunk.as_ref() }.jumbo() {
                // Safety: `region` is a member of `self.regions`.
                unsafe { self.regions.remove(region) };
                // Safety: `region` was allocated by `self.allocator`.
                unsafe { destroy_region(&*self.allocator, region) };
            } else {
                let size = region_header.size.get();
                let fresh = init_region_chunk(region, size);
                // Safety: `fresh` is a whole, fresh, free, listable chunk
                // not currently on any list.
                unsafe { self.master.push(fresh) };
            }
            cur = next;
        }
    }

    /// Detaches the region list, then for each region either
    /// reclaims it (if its sole chunk is non-jumbo, free, and spans the
    /// whole region) or re-adds it. Jumbo regions are always kept.
    fn gc(&self) {
        let mut cur = self.regions.take_all();
        while let Some(region) = cur {
            // Safety: `region` is a live region header, detached from the list.
            let region_header = unsafe { region.as_ref() };
            let next = region_header.next.get();

            let chunk = first_chunk_of(region);
            // Safety: `chunk` is the first chunk of a live region.
            let chunk_header = unsafe { chunk.as_ref() };
            let fully_free = !chunk_header.jumbo() && !chunk_header.used() && chunk_header.last();

            if fully_free {
                if chunk_header.listable() {
                    if self.master.is_head(chunk) {
                        // Safety: `chunk` is the master head.
                        unsafe { self.master.remove(chunk) };
                    } else {
                        // Safety: a listable free chunk not on master is on the recycler.
                        unsafe { self.recycler.remove(chunk) };
                    }
                }
                // Safety: `region` was allocated by `self.allocator`.
                unsafe { destroy_region(&*self.allocator, region) };
            } else {
                // Safety: `region` was just detached and is unlinked.
                unsafe { self.regions.push(region) };
            }

            cur = next;
        }
    }
}

/// Reports a fatal out-of-memory condition for `size` requested bytes,
/// matching the upstream assumption that the raw allocator essentially
/// never fails and so has no recoverable error path here. `size` is used
/// only to build a best-effort [`Layout`] for the error message/hook.
#[cold]
fn handle_alloc_error(size: usize) -> ! {
    let layout = Layout::from_size_align(size, ALIGN).unwrap_or_else(|_| Layout::new::<u8>());
    #[cfg(feature = "alloc")]
    {
        alloc::alloc::handle_alloc_error(layout)
    }
    #[cfg(not(feature = "alloc"))]
    {
        let _ = layout;
        core::panic!("out of memory")
    }
}
