/// Sector allocation bitmap

use crate::error::{DskError, Result};
use crate::format::constants::TOTAL_SECTORS;
use bit_vec::BitVec;

/// Tracks which linear sectors hold live data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorAllocation {
    bits: BitVec,
}

impl SectorAllocation {
    /// Bitmap with every sector free
    pub fn new(total_sectors: usize) -> Self {
        Self {
            bits: BitVec::from_elem(total_sectors, false),
        }
    }

    /// Bitmap sized for the standard geometry
    pub fn standard() -> Self {
        Self::new(TOTAL_SECTORS)
    }

    /// Number of sectors tracked
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// True when the bitmap tracks no sectors
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    fn check_range(&self, start: usize, count: usize) -> Result<()> {
        match start.checked_add(count) {
            Some(end) if end <= self.bits.len() => Ok(()),
            _ => Err(DskError::out_of_range(
                "sector",
                start.saturating_add(count.saturating_sub(1)),
                self.bits.len(),
            )),
        }
    }

    /// Mark a run of sectors as allocated
    ///
    /// Fails without touching the bitmap if any sector in the run is
    /// already allocated.
    pub fn allocate(&mut self, start: usize, count: usize) -> Result<()> {
        self.check_range(start, count)?;

        if let Some(taken) = (start..start + count).find(|&i| self.bits[i]) {
            return Err(DskError::SectorAlreadyAllocated(taken));
        }

        for i in start..start + count {
            self.bits.set(i, true);
        }
        log::trace!("Allocated sectors {}..{}", start, start + count);
        Ok(())
    }

    /// Mark a run of sectors as free; freeing a free sector is a no-op
    pub fn free(&mut self, start: usize, count: usize) -> Result<()> {
        self.check_range(start, count)?;

        for i in start..start + count {
            self.bits.set(i, false);
        }
        log::trace!("Freed sectors {}..{}", start, start + count);
        Ok(())
    }

    /// Is this sector allocated? Out-of-range sectors read as free.
    pub fn is_allocated(&self, linear: usize) -> bool {
        self.bits.get(linear).unwrap_or(false)
    }

    /// First sector starting a run of `count` free sectors
    pub fn find_free(&self, count: usize) -> Result<usize> {
        if count == 0 || count > self.bits.len() {
            return Err(DskError::out_of_range("sector count", count, self.bits.len() + 1));
        }

        let mut run_start = 0;
        let mut run_len = 0;
        for (i, allocated) in self.bits.iter().enumerate() {
            if allocated {
                run_len = 0;
                run_start = i + 1;
                continue;
            }
            run_len += 1;
            if run_len == count {
                return Ok(run_start);
            }
        }

        Err(DskError::DiskFull)
    }

    /// Number of free sectors
    pub fn free_space_count(&self) -> usize {
        self.bits.iter().filter(|allocated| !allocated).count()
    }

    /// Number of allocated sectors
    pub fn allocated_count(&self) -> usize {
        self.bits.len() - self.free_space_count()
    }

    /// Mark every sector free
    pub fn clear(&mut self) {
        self.bits.clear();
    }

    /// Indices of all allocated sectors
    pub fn allocated(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, allocated)| allocated.then_some(i))
    }
}

impl Default for SectorAllocation {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_allocate_and_query() {
        let mut alloc = SectorAllocation::new(20);
        alloc.allocate(2, 3).unwrap();

        assert!(!alloc.is_allocated(1));
        assert!(alloc.is_allocated(2));
        assert!(alloc.is_allocated(4));
        assert!(!alloc.is_allocated(5));
        assert!(!alloc.is_allocated(100));
        assert_eq!(alloc.free_space_count(), 17);
        assert_eq!(alloc.allocated().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn test_allocate_overlap_is_atomic() {
        let mut alloc = SectorAllocation::new(20);
        alloc.allocate(5, 1).unwrap();
        let before = alloc.clone();

        assert!(matches!(
            alloc.allocate(3, 4),
            Err(DskError::SectorAlreadyAllocated(5))
        ));
        assert_eq!(alloc, before);
    }

    #[test]
    fn test_free_is_idempotent() {
        let mut alloc = SectorAllocation::new(10);
        alloc.allocate(0, 2).unwrap();
        alloc.free(0, 2).unwrap();
        alloc.free(0, 2).unwrap();
        assert_eq!(alloc.free_space_count(), 10);
    }

    #[test]
    fn test_out_of_range() {
        let mut alloc = SectorAllocation::new(10);
        assert!(alloc.allocate(9, 2).is_err());
        assert!(alloc.free(10, 1).is_err());
        assert!(alloc.allocate(usize::MAX, 2).is_err());
        assert_eq!(alloc.free_space_count(), 10);
    }

    #[test]
    fn test_find_free_first_fit() {
        let mut alloc = SectorAllocation::new(10);
        alloc.allocate(0, 2).unwrap();
        alloc.allocate(3, 1).unwrap();

        assert_eq!(alloc.find_free(1).unwrap(), 2);
        assert_eq!(alloc.find_free(2).unwrap(), 4);
        assert!(matches!(alloc.find_free(7), Err(DskError::DiskFull)));
        assert!(alloc.find_free(0).is_err());
    }

    proptest! {
        #[test]
        fn prop_allocate_free_restores_count(start in 0usize..300, count in 1usize..60) {
            let mut alloc = SectorAllocation::standard();
            alloc.allocate(10, 5).unwrap();
            let before = alloc.free_space_count();

            if alloc.allocate(start, count).is_ok() {
                alloc.free(start, count).unwrap();
                prop_assert!(alloc.is_allocated(10));
                prop_assert_eq!(alloc.free_space_count(), before);
            } else {
                prop_assert_eq!(alloc.free_space_count(), before);
            }
        }

        #[test]
        fn prop_find_free_returns_free_run(used in proptest::collection::vec(0usize..360, 0..200), count in 1usize..10) {
            let mut alloc = SectorAllocation::standard();
            for sector in used {
                let _ = alloc.allocate(sector, 1);
            }
            if let Ok(start) = alloc.find_free(count) {
                for i in start..start + count {
                    prop_assert!(!alloc.is_allocated(i));
                }
            }
        }
    }
}
