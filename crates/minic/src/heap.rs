//! The heap arena: a byte-addressed store for globals and dynamic
//! allocations.
//!
//! The store is one contiguous growable buffer. Free space is tracked as a
//! sorted list of pairwise-disjoint half-open intervals `[lo, hi)`;
//! allocation is first-fit, trimming the chosen interval from its low end.
//! Every live allocation records its size so `FREE` takes only an address,
//! and a region freed at the end of the buffer physically shrinks the store.
//!
//! The buffer starts with one pad byte so no allocation is ever handed out
//! at address 0; word 0 stays available as the null pointer.

use ahash::AHashMap;

use crate::error::{RunError, RunResult};
use crate::expressions::{DeclId, WORD_SIZE};

#[derive(Debug)]
pub struct Heap {
    bytes: Vec<u8>,
    /// Sorted, pairwise-disjoint free intervals `[lo, hi)`.
    free_list: Vec<(usize, usize)>,
    /// Size of every live allocation, keyed by base address.
    alloc_sizes: AHashMap<usize, usize>,
    /// Heap addresses of file-scope variables; their regions are reserved
    /// outside `alloc_sizes`, so they can never be freed.
    globals: AHashMap<DeclId, usize>,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            bytes: vec![0],
            free_list: Vec::new(),
            alloc_sizes: AHashMap::new(),
            globals: AHashMap::new(),
        }
    }

    /// Current high-water mark of the byte store.
    #[cfg(test)]
    fn high_water(&self) -> usize {
        self.bytes.len()
    }

    /// Allocates `size` bytes and returns the base address.
    ///
    /// Zero-byte requests are rounded up to one byte so every allocation
    /// has a distinct, nonzero address while it is live.
    pub fn alloc(&mut self, size: usize) -> usize {
        let size = size.max(1);
        let addr = self.take(size);
        self.alloc_sizes.insert(addr, size);
        addr
    }

    /// Releases the allocation at `addr`.
    ///
    /// The freed interval is merged into the free list, coalescing with a
    /// neighbour on either side; if the merged interval reaches the end of
    /// the buffer the store shrinks instead of keeping a tail entry.
    pub fn free(&mut self, addr: usize) -> RunResult<()> {
        let size = self
            .alloc_sizes
            .remove(&addr)
            .ok_or(RunError::UnknownFree(addr as i64))?;
        let mut lo = addr;
        let mut hi = addr + size;
        let mut at = self.free_list.partition_point(|&(start, _)| start < lo);
        if at > 0 && self.free_list[at - 1].1 == lo {
            at -= 1;
            lo = self.free_list[at].0;
            self.free_list.remove(at);
        }
        if at < self.free_list.len() && self.free_list[at].0 == hi {
            hi = self.free_list[at].1;
            self.free_list.remove(at);
        }
        if hi == self.bytes.len() {
            self.bytes.truncate(lo);
        } else {
            self.free_list.insert(at, (lo, hi));
        }
        Ok(())
    }

    pub fn store_word(&mut self, addr: usize, value: i64) -> RunResult<()> {
        let slot = self
            .bytes
            .get_mut(addr..addr + WORD_SIZE)
            .ok_or(RunError::OutOfBounds {
                arena: "heap",
                addr: addr as i64,
            })?;
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn load_word(&self, addr: usize) -> RunResult<i64> {
        let slot = self
            .bytes
            .get(addr..addr + WORD_SIZE)
            .ok_or(RunError::OutOfBounds {
                arena: "heap",
                addr: addr as i64,
            })?;
        let mut raw = [0u8; WORD_SIZE];
        raw.copy_from_slice(slot);
        Ok(i64::from_le_bytes(raw))
    }

    pub fn store_byte(&mut self, addr: usize, value: i64) -> RunResult<()> {
        let slot = self
            .bytes
            .get_mut(addr)
            .ok_or(RunError::OutOfBounds {
                arena: "heap",
                addr: addr as i64,
            })?;
        *slot = value as u8;
        Ok(())
    }

    /// Loads one byte, sign-extended to a word.
    pub fn load_byte(&self, addr: usize) -> RunResult<i64> {
        let byte = self
            .bytes
            .get(addr)
            .ok_or(RunError::OutOfBounds {
                arena: "heap",
                addr: addr as i64,
            })?;
        Ok(i64::from(*byte as i8))
    }

    /// Stores a scalar of the given width (1 for `char`, a word otherwise).
    pub fn store_scalar(&mut self, addr: usize, width: usize, value: i64) -> RunResult<()> {
        if width == 1 {
            self.store_byte(addr, value)
        } else {
            self.store_word(addr, value)
        }
    }

    pub fn load_scalar(&self, addr: usize, width: usize) -> RunResult<i64> {
        if width == 1 {
            self.load_byte(addr)
        } else {
            self.load_word(addr)
        }
    }

    /// Binds a file-scope scalar: reserves a word-sized region on first
    /// sight of the decl, then writes `value` at the decl's width.
    pub fn bind_global(&mut self, decl: DeclId, width: usize, value: i64) -> RunResult<()> {
        let addr = match self.globals.get(&decl) {
            Some(&addr) => addr,
            None => {
                let addr = self.take(WORD_SIZE);
                self.globals.insert(decl, addr);
                addr
            }
        };
        self.store_scalar(addr, width, value)
    }

    /// Reserves `size` zeroed bytes for a file-scope array and binds the
    /// decl to the base address.
    pub fn bind_global_array(&mut self, decl: DeclId, size: usize) -> usize {
        let addr = self.take(size.max(1));
        self.globals.insert(decl, addr);
        addr
    }

    /// Heap address of a file-scope variable, if the decl is one.
    pub fn global_addr(&self, decl: DeclId) -> Option<usize> {
        self.globals.get(&decl).copied()
    }

    /// First-fit carve-out; does not record a size, callers decide whether
    /// the region is freeable.
    fn take(&mut self, size: usize) -> usize {
        for i in 0..self.free_list.len() {
            let (lo, hi) = self.free_list[i];
            if hi - lo >= size {
                self.free_list[i].0 += size;
                if self.free_list[i].0 == hi {
                    self.free_list.remove(i);
                }
                return lo;
            }
        }
        let addr = self.bytes.len();
        self.bytes.resize(addr + size, 0);
        addr
    }

    #[cfg(test)]
    fn free_intervals(&self) -> &[(usize, usize)] {
        &self.free_list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(heap: &Heap) {
        // free intervals sorted, disjoint, nonempty, inside the store
        let mut prev_hi = 0;
        for &(lo, hi) in heap.free_intervals() {
            assert!(lo < hi, "empty or inverted interval [{lo}, {hi})");
            assert!(lo >= prev_hi, "intervals out of order or overlapping");
            assert!(hi <= heap.high_water());
            prev_hi = hi;
        }
        // no allocation overlaps a free interval
        for (&addr, &size) in &heap.alloc_sizes {
            for &(lo, hi) in heap.free_intervals() {
                assert!(addr + size <= lo || addr >= hi, "allocation [{addr}, {}) overlaps free [{lo}, {hi})", addr + size);
            }
        }
    }

    #[test]
    fn alloc_never_returns_zero() {
        let mut heap = Heap::new();
        assert_ne!(heap.alloc(0), 0);
        assert_ne!(heap.alloc(16), 0);
        assert_invariants(&heap);
    }

    #[test]
    fn free_then_alloc_reuses_the_region() {
        let mut heap = Heap::new();
        let a = heap.alloc(16);
        let b = heap.alloc(16);
        heap.free(a).unwrap();
        assert_invariants(&heap);
        // first-fit hands the coalesced hole back out
        assert_eq!(heap.alloc(8), a);
        assert_invariants(&heap);
        heap.free(b).unwrap();
        assert_invariants(&heap);
    }

    #[test]
    fn free_at_high_water_shrinks_the_store() {
        let mut heap = Heap::new();
        let a = heap.alloc(16);
        let before = heap.high_water();
        let b = heap.alloc(32);
        heap.free(b).unwrap();
        assert_eq!(heap.high_water(), before);
        assert!(heap.free_intervals().is_empty());
        heap.free(a).unwrap();
        assert_eq!(heap.high_water(), 1);
        assert_invariants(&heap);
    }

    #[test]
    fn adjacent_frees_coalesce() {
        let mut heap = Heap::new();
        let a = heap.alloc(8);
        let b = heap.alloc(8);
        let c = heap.alloc(8);
        let _keep = heap.alloc(8);
        heap.free(a).unwrap();
        heap.free(c).unwrap();
        assert_eq!(heap.free_intervals().len(), 2);
        heap.free(b).unwrap();
        assert_eq!(heap.free_intervals(), &[(a, c + 8)]);
        assert_invariants(&heap);
    }

    #[test]
    fn free_of_foreign_address_is_fatal() {
        let mut heap = Heap::new();
        let a = heap.alloc(8);
        assert_eq!(heap.free(a + 1), Err(RunError::UnknownFree(a as i64 + 1)));
        heap.free(a).unwrap();
        assert_eq!(heap.free(a), Err(RunError::UnknownFree(a as i64)));
    }

    #[test]
    fn words_and_bytes_round_trip() {
        let mut heap = Heap::new();
        let a = heap.alloc(WORD_SIZE * 2);
        heap.store_word(a, -42).unwrap();
        heap.store_word(a + WORD_SIZE, i64::MAX).unwrap();
        assert_eq!(heap.load_word(a).unwrap(), -42);
        assert_eq!(heap.load_word(a + WORD_SIZE).unwrap(), i64::MAX);

        let b = heap.alloc(1);
        heap.store_byte(b, 0xff).unwrap();
        // byte loads sign-extend
        assert_eq!(heap.load_byte(b).unwrap(), -1);
    }

    #[test]
    fn out_of_bounds_access_is_an_error() {
        let heap = Heap::new();
        assert!(matches!(heap.load_word(100), Err(RunError::OutOfBounds { .. })));
    }

    #[test]
    fn globals_rebind_in_place_and_cannot_be_freed() {
        let mut heap = Heap::new();
        let decl = DeclId::new(0);
        heap.bind_global(decl, WORD_SIZE, 7).unwrap();
        let addr = heap.global_addr(decl).unwrap();
        heap.bind_global(decl, WORD_SIZE, 9).unwrap();
        assert_eq!(heap.global_addr(decl).unwrap(), addr);
        assert_eq!(heap.load_word(addr).unwrap(), 9);
        assert_eq!(heap.free(addr), Err(RunError::UnknownFree(addr as i64)));
    }
}
