//! The recycler: a circular doubly-linked list of previously-used free
//! chunks, with a self-adjusting head and the "wheel of fortune" rotation
//! rule.
//!
//! The recycler trades a strict best-fit scan (O(n) per allocation) for an
//! amortized good-fit heuristic: `insert` promotes a new chunk to head only
//! if it is larger than the current head, and `cycle` (run after every
//! small allocation) keeps large chunks near the head while still giving
//! every chunk a chance to reach it over time.

use core::cell::Cell;
use core::ptr::NonNull;

use crate::header::ChunkHeader;

pub(crate) struct Recycler {
    head: Cell<Option<NonNull<ChunkHeader>>>,
}

impl Recycler {
    #[inline]
    pub const fn new() -> Self {
        Recycler { head: Cell::new(None) }
    }

    #[inline]
    pub fn head(&self) -> Option<NonNull<ChunkHeader>> {
        self.head.get()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.get().is_none()
    }

    #[inline]
    pub fn is_head(&self, chunk: NonNull<ChunkHeader>) -> bool {
        self.head.get() == Some(chunk)
    }

    /// Empties the list without touching any chunk's link fields. Safe only
    /// when every chunk the list referenced is about to be reinitialized or
    /// discarded anyway, as in `free_all`.
    #[inline]
    pub fn clear(&self) {
        self.head.set(None);
    }

    /// Inserts `chunk` into the cycle, promoting it to head if it is larger
    /// than the current head.
    ///
    /// # Safety
    ///
    /// `chunk` must be free, listable, and not already on any free list.
    pub unsafe fn insert(&self, chunk: NonNull<ChunkHeader>) {
        // Safety: caller guarantees `chunk` is free and listable.
        let link = unsafe { chunk.as_ref().free_link() };

        match self.head.get() {
            None => {
                link.prev.set(Some(chunk));
                link.next.set(Some(chunk));
                self.head.set(Some(chunk));
            }
            Some(head) => {
                // Safety: `head` is a live recycler member.
                let head_link = unsafe { head.as_ref().free_link() };
                let tail = head_link.prev.get().expect("recycler head always has a prev");

                link.next.set(Some(head));
                link.prev.set(Some(tail));
                // Safety: `tail` is a live recycler member.
                unsafe { tail.as_ref().free_link() }.next.set(Some(chunk));
                head_link.prev.set(Some(chunk));

                // Safety: `chunk`/`head` are both live headers.
                if unsafe { chunk.as_ref().len() > head.as_ref().len() } {
                    self.head.set(Some(chunk));
                }
            }
        }
    }

    /// Removes `chunk` from the cycle, wherever it sits.
    ///
    /// # Safety
    ///
    /// `chunk` must currently be a member of this recycler.
    pub unsafe fn remove(&self, chunk: NonNull<ChunkHeader>) {
        // Safety: caller guarantees `chunk` is a live recycler member.
        let link = unsafe { chunk.as_ref().free_link() };
        let prev = link.prev.get().expect("recycler members are always linked");
        let next = link.next.get().expect("recycler members are always linked");

        if prev == chunk && next == chunk {
            // Sole member; empty the list.
            self.head.set(None);
        } else {
            // Safety: circular list, no null checks needed.
            unsafe { prev.as_ref().free_link() }.next.set(Some(next));
            unsafe { next.as_ref().free_link() }.prev.set(Some(prev));
            if self.is_head(chunk) {
                self.head.set(Some(next));
            }
        }
    }

    /// Replaces `old` with `new` at the same position in the cycle,
    /// preserving neighbor links (including the singleton self-loop case).
    /// Used by `split_free` when the tail of a split recycler chunk takes
    /// over the original's slot.
    ///
    /// # Safety
    ///
    /// `old` must currently be a member of this recycler; `new` must be
    /// free, listable, and not already on any free list.
    pub unsafe fn replace(&self, old: NonNull<ChunkHeader>, new: NonNull<ChunkHeader>) {
        // Safety: caller guarantees `old` is a live recycler member.
        let old_link = unsafe { old.as_ref().free_link() };
        let prev = old_link.prev.get().expect("recycler members are always linked");
        let next = old_link.next.get().expect("recycler members are always linked");

        // Safety: caller guarantees `new` is free and listable.
        let new_link = unsafe { new.as_ref().free_link() };

        if prev == old {
            debug_assert_eq!(next, old, "a chunk with prev==self must also have next==self");
            new_link.prev.set(Some(new));
            new_link.next.set(Some(new));
        } else {
            new_link.prev.set(Some(prev));
            new_link.next.set(Some(next));
            unsafe { prev.as_ref().free_link() }.next.set(Some(new));
            unsafe { next.as_ref().free_link() }.prev.set(Some(new));
        }

        if self.is_head(old) {
            self.head.set(Some(new));
        }
    }

    /// The "wheel of fortune" rotation, run after every successful small
    /// allocation. Statement order matters here: aliasing between the
    /// head's and its neighbor's link fields on very short cycles (2
    /// members) makes this not simply reorderable, so it is transcribed
    /// field-write-by-field-write rather than via precomputed locals.
    ///
    /// # Safety
    ///
    /// The recycler must be non-empty.
    pub unsafe fn cycle(&self) {
        let h = match self.head.get() {
            Some(h) => h,
            None => return,
        };
        // Safety: `h` is a live recycler head.
        let h_link = unsafe { h.as_ref().free_link() };
        let n = h_link.next.get().expect("recycler head always has a next");

        if n == h {
            // Singleton cycle; nothing to rotate.
            return;
        }

        // Safety: `n`/`h` are both live headers.
        if unsafe { n.as_ref().len() < h.as_ref().len() } {
            // Safety: `n` is a live recycler member.
            let n_link = unsafe { n.as_ref().free_link() };

            // Hold `h` fixed in the ring while `n` trades places with
            // whatever used to be two positions past `h`.
            n_link.prev.set(h_link.prev.get());
            unsafe { h_link.prev.get().unwrap().as_ref().free_link() }
                .next
                .set(h_link.next.get());

            h_link.prev.set(h_link.next.get());
            h_link.next.set(n_link.next.get());

            unsafe { h_link.next.get().unwrap().as_ref().free_link() }
                .prev
                .set(Some(h));
            unsafe { h_link.prev.get().unwrap().as_ref().free_link() }
                .next
                .set(Some(h));
        } else {
            // Whole-list rotation.
            self.head.set(Some(n));
        }
    }
}
