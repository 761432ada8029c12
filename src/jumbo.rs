//! The jumbo path: requests too large for a normal region each get a
//! dedicated region sized to fit exactly.

use core::ptr::NonNull;

use allocator_api2::alloc::{AllocError, Allocator};

use crate::header::{ChunkHeader, RegionHeader};
use crate::region::{destroy_region, first_chunk_of, jumbo_region_size, new_region, region_layout, region_of, RegionList};

/// Allocates a fresh jumbo region sized to fit exactly `size` usable bytes
/// and returns its (already-`used`) chunk's data pointer.
pub(crate) fn alloc_jumbo<A: Allocator>(alloc: &A, regions: &RegionList, size: usize) -> Result<NonNull<u8>, AllocError> {
    let region_size = jumbo_region_size(size);
    let region = new_region(alloc, region_size)?;
    let chunk = first_chunk_of(region);
    // Safety: `chunk` is freshly carved space inside a region just allocated.
    let header = unsafe { chunk.as_ref() };
    header.set_prev_offset(0);
    // `len` is left at 0: a jumbo chunk's true size routinely exceeds the
    // 29-bit field's ~512 MiB range, so it is never meaningful here and is
    // tracked on the region header instead (see `region::jumbo_data_len`).
    header.set_len(0);
    header.set_last(true);
    header.set_used(true);
    header.set_jumbo(true);
    // Safety: `region` is fresh and not yet linked anywhere else.
    unsafe { regions.push(region) };
    Ok(NonNull::new(header.data_ptr()).unwrap())
}

/// Unlinks and releases a jumbo chunk's entire region.
///
/// # Safety
///
/// `chunk` must be the sole, `jumbo`-marked chunk of a region in `regions`.
pub(crate) unsafe fn free_jumbo<A: Allocator>(alloc: &A, regions: &RegionList, chunk: NonNull<ChunkHeader>) {
    // Safety: caller guarantees `chunk` is the first (and only) chunk of its region.
    let region = unsafe { region_of(chunk) };
    unsafe { regions.remove(region) };
    unsafe { destroy_region(alloc, region) };
}

/// Resizes a jumbo allocation in place via the underlying allocator's
/// `grow`/`shrink`, which may move the backing memory; fixes up the region
/// list and the chunk header to match.
///
/// # Safety
///
/// `chunk` must be the sole, `jumbo`-marked chunk of a region in `regions`.
pub(crate) unsafe fn realloc_jumbo<A: Allocator>(
    alloc: &A,
    regions: &RegionList,
    chunk: NonNull<ChunkHeader>,
    new_size: usize,
) -> Result<NonNull<u8>, AllocError> {
    // Safety: caller guarantees `chunk` is the first chunk of its jumbo region.
    let old_region = unsafe { region_of(chunk) };
    // Safety: `old_region` is a live region header.
    let old_region_size = unsafe { old_region.as_ref() }.size.get();
    let new_region_size = jumbo_region_size(new_size);

    let old_layout = region_layout(old_region_size);
    let new_layout = region_layout(new_region_size);
    let old_ptr: NonNull<u8> = old_region.cast();

    // Safety: `old_ptr`/`old_layout` describe the region's live backing
    // allocation, obtained from `alloc` by `new_region`.
    let new_block = if new_region_size >= old_region_size {
        unsafe { alloc.grow(old_ptr, old_layout, new_layout) }?
    } else {
        unsafe { alloc.shrink(old_ptr, old_layout, new_layout) }?
    };
    let new_region: NonNull<RegionHeader> = new_block.cast();

    // Safety: `new_region` carries `old_region`'s header bytes, preserved by
    // `grow`/`shrink` across the move (they copy `min(old, new)` bytes).
    unsafe { new_region.as_ref() }.size.set(new_region_size);
    // Safety: `old_region` was a member of `regions`; `new_region` holds its
    // preserved prev/next.
    unsafe { regions.relocate(old_region, new_region) };

    let new_chunk = first_chunk_of(new_region);
    // Safety: `new_chunk` is the relocated jumbo chunk's header.
    let header = unsafe { new_chunk.as_ref() };
    // `len` stays at 0, as `alloc_jumbo` left it: the new region's true size
    // lives on its own header (just updated above), not in the 29-bit field.
    Ok(NonNull::new(header.data_ptr()).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::jumbo_data_len;
    use allocator_api2::alloc::Global;

    #[test]
    fn alloc_jumbo_marks_chunk_and_links_region() {
        let regions = RegionList::new();
        let ptr = alloc_jumbo(&Global, &regions, 1 << 20).unwrap();
        // Safety: test-only introspection of a chunk we just created.
        unsafe {
            let chunk = ChunkHeader::from_data_ptr(ptr.as_ptr());
            assert!(chunk.as_ref().used());
            assert!(chunk.as_ref().last());
            assert!(chunk.as_ref().jumbo());
            assert_eq!(chunk.as_ref().len(), 0, "len is left unused for jumbo chunks");
            assert!(jumbo_data_len(region_of(chunk)) >= 1 << 20);
            assert_eq!(regions.head(), Some(region_of(chunk)));
            free_jumbo(&Global, &regions, chunk);
            assert_eq!(regions.head(), None);
        }
    }

    #[test]
    fn realloc_jumbo_grows_and_preserves_list_membership() {
        let regions = RegionList::new();
        let ptr = alloc_jumbo(&Global, &regions, 4096).unwrap();
        unsafe {
            let chunk = ChunkHeader::from_data_ptr(ptr.as_ptr());
            let grown = realloc_jumbo(&Global, &regions, chunk, 1 << 20).unwrap();
            let grown_chunk = ChunkHeader::from_data_ptr(grown.as_ptr());
            assert!(jumbo_data_len(region_of(grown_chunk)) >= 1 << 20);
            assert_eq!(regions.head(), Some(region_of(grown_chunk)));
            free_jumbo(&Global, &regions, grown_chunk);
        }
    }
}
