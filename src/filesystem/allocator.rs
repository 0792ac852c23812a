/// Block allocation on top of the sector bitmap
///
/// Blocks are the filesystem's allocation unit. A block is free when every
/// sector it covers is free in the bitmap; the reserved boot and directory
/// blocks stay allocated and are never handed out.

use crate::error::{DskError, Result};
use crate::format::constants::*;
use crate::image::SectorAllocation;

/// Number of blocks needed to hold `byte_size` bytes
pub fn blocks_needed(byte_size: usize) -> usize {
    byte_size.div_ceil(BLOCK_SIZE)
}

/// Allocates and frees blocks through a borrowed sector bitmap
pub struct BlockAllocator<'a> {
    sectors: &'a mut SectorAllocation,
}

impl<'a> BlockAllocator<'a> {
    /// Wrap a sector bitmap
    pub fn new(sectors: &'a mut SectorAllocation) -> Self {
        Self { sectors }
    }

    /// Mark the boot and directory blocks allocated
    pub fn reserve_system_blocks(&mut self) {
        for sector in 0..RESERVED_SECTORS {
            if !self.sectors.is_allocated(sector) {
                // in range by construction
                let _ = self.sectors.allocate(sector, 1);
            }
        }
    }

    /// Is this a data block with all of its sectors free?
    pub fn is_block_free(&self, block: usize) -> bool {
        if !(RESERVED_BLOCKS..TOTAL_BLOCKS).contains(&block) {
            return false;
        }
        let first = block * SECTORS_PER_BLOCK;
        (first..first + SECTORS_PER_BLOCK).all(|s| !self.sectors.is_allocated(s))
    }

    /// Is any sector of this block allocated?
    pub fn is_block_allocated(&self, block: usize) -> bool {
        let first = block * SECTORS_PER_BLOCK;
        (first..first + SECTORS_PER_BLOCK).any(|s| self.sectors.is_allocated(s))
    }

    /// Number of free data blocks
    pub fn free_block_count(&self) -> usize {
        (RESERVED_BLOCKS..TOTAL_BLOCKS)
            .filter(|&b| self.is_block_free(b))
            .count()
    }

    /// First block of the lowest run of `count` free blocks
    pub fn find_contiguous_blocks(&self, count: usize) -> Result<usize> {
        if count == 0 {
            return Err(DskError::out_of_range("block count", 0, TOTAL_BLOCKS));
        }

        let mut run = 0;
        for block in RESERVED_BLOCKS..TOTAL_BLOCKS {
            if self.is_block_free(block) {
                run += 1;
                if run == count {
                    return Ok(block + 1 - count);
                }
            } else {
                run = 0;
            }
        }
        Err(DskError::DiskFull)
    }

    /// Allocate enough blocks to hold `byte_size` bytes
    pub fn allocate(&mut self, byte_size: usize) -> Result<Vec<usize>> {
        let count = blocks_needed(byte_size);
        if count > MAX_BLOCKS_PER_FILE {
            return Err(DskError::FileTooLarge {
                size: byte_size,
                max: MAX_BLOCKS_PER_FILE * BLOCK_SIZE,
            });
        }
        self.allocate_blocks(count)
    }

    /// Allocate `count` blocks, contiguous when possible
    ///
    /// Falls back to the lowest free blocks when no single run is long
    /// enough. On failure nothing stays allocated.
    pub fn allocate_blocks(&mut self, count: usize) -> Result<Vec<usize>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if count > MAX_BLOCKS_PER_FILE {
            return Err(DskError::FileTooLarge {
                size: count * BLOCK_SIZE,
                max: MAX_BLOCKS_PER_FILE * BLOCK_SIZE,
            });
        }

        let candidates: Vec<usize> = match self.find_contiguous_blocks(count) {
            Ok(start) => (start..start + count).collect(),
            Err(_) => {
                let free: Vec<usize> = (RESERVED_BLOCKS..TOTAL_BLOCKS)
                    .filter(|&b| self.is_block_free(b))
                    .take(count)
                    .collect();
                if free.len() < count {
                    return Err(DskError::DiskFull);
                }
                log::debug!("No contiguous run of {} blocks, allocating fragmented", count);
                free
            }
        };

        let mut claimed = Vec::with_capacity(count);
        for &block in &candidates {
            if let Err(e) = self.sectors.allocate(block * SECTORS_PER_BLOCK, SECTORS_PER_BLOCK) {
                log::warn!("Block allocation failed at block {}, rolling back", block);
                for &b in &claimed {
                    let _ = self.sectors.free(b * SECTORS_PER_BLOCK, SECTORS_PER_BLOCK);
                }
                return Err(e);
            }
            claimed.push(block);
        }

        log::debug!("Allocated blocks {:?}", claimed);
        Ok(claimed)
    }

    /// Return blocks to the free pool
    pub fn free(&mut self, blocks: &[usize]) -> Result<()> {
        if let Some(&bad) = blocks
            .iter()
            .find(|&&b| !(RESERVED_BLOCKS..TOTAL_BLOCKS).contains(&b))
        {
            return Err(DskError::out_of_range("data block", bad, TOTAL_BLOCKS));
        }

        for &block in blocks {
            self.sectors
                .free(block * SECTORS_PER_BLOCK, SECTORS_PER_BLOCK)?;
        }
        log::debug!("Freed blocks {:?}", blocks);
        Ok(())
    }

    /// Mark specific blocks allocated, e.g. when replaying a directory
    pub fn claim(&mut self, block: usize) -> Result<()> {
        if !(RESERVED_BLOCKS..TOTAL_BLOCKS).contains(&block) {
            return Err(DskError::out_of_range("data block", block, TOTAL_BLOCKS));
        }
        self.sectors
            .allocate(block * SECTORS_PER_BLOCK, SECTORS_PER_BLOCK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reserved_bitmap() -> SectorAllocation {
        let mut sectors = SectorAllocation::standard();
        BlockAllocator::new(&mut sectors).reserve_system_blocks();
        sectors
    }

    #[test]
    fn test_blocks_needed() {
        assert_eq!(blocks_needed(0), 0);
        assert_eq!(blocks_needed(1), 1);
        assert_eq!(blocks_needed(1024), 1);
        assert_eq!(blocks_needed(1025), 2);
    }

    #[test]
    fn test_reserved_blocks_never_free() {
        let mut sectors = reserved_bitmap();
        let allocator = BlockAllocator::new(&mut sectors);

        assert!(!allocator.is_block_free(0));
        assert!(!allocator.is_block_free(2));
        assert!(allocator.is_block_free(3));
        assert_eq!(allocator.free_block_count(), 177);
    }

    #[test]
    fn test_allocate_contiguous() {
        let mut sectors = reserved_bitmap();
        let mut allocator = BlockAllocator::new(&mut sectors);

        assert_eq!(allocator.allocate(3000).unwrap(), vec![3, 4, 5]);
        assert_eq!(allocator.allocate(1).unwrap(), vec![6]);
        assert!(allocator.allocate(0).unwrap().is_empty());
        assert_eq!(allocator.free_block_count(), 173);
    }

    #[test]
    fn test_allocate_fragmented_fallback() {
        let mut sectors = reserved_bitmap();
        let mut allocator = BlockAllocator::new(&mut sectors);

        // leave only every other block free
        let all = allocator.allocate_blocks(177).unwrap();
        let gaps: Vec<usize> = all.iter().copied().filter(|b| b % 2 == 0).collect();
        allocator.free(&gaps).unwrap();

        assert!(allocator.find_contiguous_blocks(2).is_err());
        assert_eq!(allocator.allocate_blocks(3).unwrap(), vec![4, 6, 8]);
    }

    #[test]
    fn test_disk_full_leaves_state_untouched() {
        let mut sectors = reserved_bitmap();
        let mut allocator = BlockAllocator::new(&mut sectors);
        allocator.allocate_blocks(170).unwrap();

        assert!(matches!(
            allocator.allocate_blocks(8),
            Err(DskError::DiskFull)
        ));
        assert_eq!(allocator.free_block_count(), 7);
    }

    #[test]
    fn test_too_many_blocks() {
        let mut sectors = reserved_bitmap();
        let before = sectors.clone();
        let mut allocator = BlockAllocator::new(&mut sectors);

        assert!(matches!(
            allocator.allocate((MAX_BLOCKS_PER_FILE + 1) * BLOCK_SIZE),
            Err(DskError::FileTooLarge { .. })
        ));
        assert_eq!(sectors, before);
    }

    #[test]
    fn test_free_rejects_reserved() {
        let mut sectors = reserved_bitmap();
        let mut allocator = BlockAllocator::new(&mut sectors);
        assert!(allocator.free(&[1]).is_err());
        assert!(allocator.free(&[TOTAL_BLOCKS]).is_err());
    }

    proptest! {
        #[test]
        fn prop_contiguous_run_is_free(taken in proptest::collection::vec(3usize..180, 0..120), count in 1usize..12) {
            let mut sectors = reserved_bitmap();
            let mut allocator = BlockAllocator::new(&mut sectors);
            for block in taken {
                let _ = allocator.claim(block);
            }
            if let Ok(start) = allocator.find_contiguous_blocks(count) {
                for block in start..start + count {
                    prop_assert!(allocator.is_block_free(block));
                }
            }
        }
    }
}
