//! Boundary-tag allocator over one growable byte buffer.
//!
//! The buffer is partitioned into blocks without gaps. Every block starts and ends with the same
//! 4-byte signed tag holding the block size: positive for allocated blocks, negative for free
//! ones. Block sizes are powers of two when carved by [`Heap::alloc`]; the payload lies between
//! the two tags.
//!
//! ```text
//! | +16 | payload (8) | +16 | -8 | -8 | -1000 | ...free... | -1000 |
//! ```
//!
//! Freeing never coalesces; [`Heap::defragment`] merges runs of free blocks and is meant to be
//! called periodically (once per scheduler tick).
//!
//! # Invariants
//!
//! After every public operation the header and trailer tags of each block agree, and the block
//! sizes add up to the buffer length. [`Heap::validate`] checks both.
//!
//! # Examples
//!
//! ```rust
//! use dotrun::emulation::Heap;
//!
//! let mut heap = Heap::new(1024)?;
//! let cell = heap.alloc(4)?;
//! heap.write_i32(cell, 42)?;
//! assert_eq!(heap.read_i32(cell)?, 42);
//!
//! heap.free(cell)?;
//! heap.defragment()?;
//! heap.validate()?;
//! # Ok::<(), dotrun::Error>(())
//! ```

use log::debug;

use crate::{
    emulation::EmulationError,
    file::io::{read_le_at, write_le_at, CilIO},
    Result,
};

/// Size of one boundary tag.
pub const TAG_SIZE: usize = 4;

/// Bytes every block spends on its two tags.
pub const BLOCK_OVERHEAD: usize = 2 * TAG_SIZE;

/// A block as described by its boundary tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Offset of the header tag
    pub offset: usize,
    /// Block size including both tags
    pub size: usize,
    /// Positive tags
    pub allocated: bool,
}

impl Block {
    /// Offset of the first payload byte.
    #[must_use]
    pub fn payload(&self) -> usize {
        self.offset + TAG_SIZE
    }

    /// Number of payload bytes.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.size - BLOCK_OVERHEAD
    }
}

/// Iterator over the blocks of a [`Heap`], in address order.
///
/// Yields an error and stops at the first block whose tags are inconsistent.
pub struct Blocks<'a> {
    heap: &'a Heap,
    offset: usize,
    failed: bool,
}

impl Iterator for Blocks<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.heap.data.len() {
            return None;
        }

        match self.heap.block_at(self.offset) {
            Ok(block) => {
                self.offset += block.size;
                Some(Ok(block))
            }
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
        }
    }
}

/// The boundary-tagged allocator backing primitive local variables.
#[derive(Debug, Clone)]
pub struct Heap {
    data: Vec<u8>,
}

impl Heap {
    /// Create a heap with `initial_size` payload bytes in one free block.
    ///
    /// # Errors
    /// Returns [`EmulationError::ArithmeticOverflow`] if the buffer would not fit a tag.
    pub fn new(initial_size: usize) -> Result<Heap> {
        let len = initial_size
            .checked_add(BLOCK_OVERHEAD)
            .filter(|len| i32::try_from(*len).is_ok())
            .ok_or(EmulationError::ArithmeticOverflow)?;

        let mut heap = Heap { data: vec![0; len] };
        heap.write_tags(0, len, false)?;
        Ok(heap)
    }

    /// Length of the buffer in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer is empty, which a constructed heap never is.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw buffer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Walk all blocks in address order.
    #[must_use]
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            heap: self,
            offset: 0,
            failed: false,
        }
    }

    /// Total size of all free blocks, tags included.
    ///
    /// # Errors
    /// Returns [`EmulationError::HeapCorruption`] if the walk hits inconsistent tags.
    pub fn free_bytes(&self) -> Result<usize> {
        self.blocks().try_fold(0, |total, block| {
            let block = block?;
            Ok(if block.allocated {
                total
            } else {
                total + block.size
            })
        })
    }

    /// Check that every block has matching tags and that the blocks cover the whole buffer.
    ///
    /// # Errors
    /// Returns [`EmulationError::HeapCorruption`] on the first violation.
    pub fn validate(&self) -> Result<()> {
        let mut covered = 0;
        for block in self.blocks() {
            covered += block?.size;
        }

        if covered != self.data.len() {
            return Err(EmulationError::HeapCorruption { offset: covered }.into());
        }
        Ok(())
    }

    /// Allocate a zeroed block with at least `size` payload bytes, returning the payload offset.
    ///
    /// The block size is `size + 8` rounded up to a power of two; the first free block that is
    /// large enough is split. Grows the buffer when nothing fits.
    ///
    /// # Errors
    /// Returns [`EmulationError::HeapCorruption`] if the block walk fails, or
    /// [`EmulationError::ArithmeticOverflow`] if the heap cannot grow any further.
    pub fn alloc(&mut self, size: usize) -> Result<usize> {
        let block_size = size
            .checked_add(BLOCK_OVERHEAD)
            .and_then(usize::checked_next_power_of_two)
            .ok_or(EmulationError::ArithmeticOverflow)?;

        loop {
            if let Some(block) = self.first_fit(block_size)? {
                return self.carve(block, block_size);
            }

            let wanted = size
                .checked_mul(2)
                .and_then(|extra| extra.checked_add(self.data.len()))
                .ok_or(EmulationError::ArithmeticOverflow)?;
            self.expand(wanted)?;
        }
    }

    /// Release the block whose payload starts at `offset`.
    ///
    /// # Errors
    /// Returns [`EmulationError::InvalidFree`] if the header tag is not positive (double free or
    /// a pointer that never came from [`Heap::alloc`]) and [`EmulationError::HeapCorruption`]
    /// if the trailer tag does not match the header.
    pub fn free(&mut self, offset: usize) -> Result<()> {
        let invalid = || EmulationError::InvalidFree { offset };

        let start = offset.checked_sub(TAG_SIZE).ok_or_else(invalid)?;
        let header = self.tag_at(start).map_err(|_| invalid())?;
        if header <= 0 {
            return Err(invalid().into());
        }

        let size = header.unsigned_abs() as usize;
        let corrupted = EmulationError::HeapCorruption { offset: start };
        if size < BLOCK_OVERHEAD {
            return Err(corrupted.into());
        }

        let trailer = self
            .tag_at(start + size - TAG_SIZE)
            .map_err(|_| corrupted.clone())?;
        if trailer != header {
            return Err(corrupted.into());
        }

        self.write_tags(start, size, false)
    }

    /// Grow the buffer to at least `size` bytes.
    ///
    /// The new length is `size` rounded up to a power of two; a `size` smaller than the current
    /// length is taken as an increment instead. The new capacity extends a trailing free block
    /// or becomes a new free block.
    ///
    /// # Errors
    /// Returns [`EmulationError::ArithmeticOverflow`] if the new length does not fit a tag.
    pub fn expand(&mut self, size: usize) -> Result<()> {
        let len = self.data.len();
        let overflow = EmulationError::ArithmeticOverflow;

        let target = if size < len {
            size.checked_add(len).ok_or(overflow.clone())?
        } else {
            size
        };
        let mut new_len = target
            .checked_next_power_of_two()
            .ok_or(overflow.clone())?;
        if new_len - len < BLOCK_OVERHEAD {
            new_len = new_len.checked_mul(2).ok_or(overflow.clone())?;
        }
        if i32::try_from(new_len).is_err() {
            return Err(overflow.into());
        }

        let mut last = None;
        for block in self.blocks() {
            last = Some(block?);
        }

        self.data.resize(new_len, 0);
        match last {
            Some(block) if !block.allocated => {
                self.write_tags(block.offset, new_len - block.offset, false)?;
            }
            _ => self.write_tags(len, new_len - len, false)?,
        }

        debug!("Heap expanded from {len} to {new_len} bytes");
        Ok(())
    }

    /// Merge every run of two or more adjacent free blocks into one block.
    ///
    /// Solitary free blocks are left untouched, so a second call right after the first changes
    /// nothing. Returns the number of runs merged.
    ///
    /// # Errors
    /// Returns [`EmulationError::HeapCorruption`] if the block walk fails.
    pub fn defragment(&mut self) -> Result<usize> {
        let blocks = self.blocks().collect::<Result<Vec<_>>>()?;

        let mut merged = 0;
        let mut index = 0;
        while index < blocks.len() {
            let first = blocks[index];
            index += 1;
            if first.allocated {
                continue;
            }

            let mut end = first.offset + first.size;
            let mut run = 1;
            while let Some(next) = blocks.get(index).filter(|block| !block.allocated) {
                end = next.offset + next.size;
                run += 1;
                index += 1;
            }

            if run >= 2 {
                self.write_tags(first.offset, end - first.offset, false)?;
                merged += 1;
            }
        }

        Ok(merged)
    }

    /// Read a primitive at a payload offset.
    ///
    /// # Errors
    /// Returns [`EmulationError::HeapCorruption`] if the value lies outside the buffer.
    pub fn read<T: CilIO>(&self, offset: usize) -> Result<T> {
        let mut cursor = offset;
        read_le_at::<T>(&self.data, &mut cursor)
            .map_err(|_| EmulationError::HeapCorruption { offset }.into())
    }

    /// Write a primitive at a payload offset.
    ///
    /// # Errors
    /// Returns [`EmulationError::HeapCorruption`] if the value lies outside the buffer.
    pub fn write<T: CilIO>(&mut self, offset: usize, value: T) -> Result<()> {
        let mut cursor = offset;
        write_le_at(&mut self.data, &mut cursor, value)
            .map_err(|_| EmulationError::HeapCorruption { offset }.into())
    }

    /// Read a 32-bit integer cell.
    ///
    /// # Errors
    /// See [`Heap::read`].
    pub fn read_i32(&self, offset: usize) -> Result<i32> {
        self.read::<i32>(offset)
    }

    /// Write a 32-bit integer cell.
    ///
    /// # Errors
    /// See [`Heap::write`].
    pub fn write_i32(&mut self, offset: usize, value: i32) -> Result<()> {
        self.write(offset, value)
    }

    /// Read a 64-bit integer cell.
    ///
    /// # Errors
    /// See [`Heap::read`].
    pub fn read_i64(&self, offset: usize) -> Result<i64> {
        self.read::<i64>(offset)
    }

    /// Write a 64-bit integer cell.
    ///
    /// # Errors
    /// See [`Heap::write`].
    pub fn write_i64(&mut self, offset: usize, value: i64) -> Result<()> {
        self.write(offset, value)
    }

    fn tag_at(&self, offset: usize) -> Result<i32> {
        self.read::<i32>(offset)
    }

    fn block_at(&self, offset: usize) -> Result<Block> {
        let corrupted = || EmulationError::HeapCorruption { offset };

        let tag = self.tag_at(offset)?;
        let size = tag.unsigned_abs() as usize;
        if size < BLOCK_OVERHEAD || offset + size > self.data.len() {
            return Err(corrupted().into());
        }
        if self.tag_at(offset + size - TAG_SIZE)? != tag {
            return Err(corrupted().into());
        }

        Ok(Block {
            offset,
            size,
            allocated: tag > 0,
        })
    }

    fn write_tags(&mut self, offset: usize, size: usize, allocated: bool) -> Result<()> {
        let magnitude = i32::try_from(size).map_err(|_| EmulationError::ArithmeticOverflow)?;
        let tag = if allocated { magnitude } else { -magnitude };

        self.write(offset, tag)?;
        self.write(offset + size - TAG_SIZE, tag)
    }

    fn first_fit(&self, block_size: usize) -> Result<Option<Block>> {
        for block in self.blocks() {
            let block = block?;
            if !block.allocated && block.size >= block_size {
                return Ok(Some(block));
            }
        }
        Ok(None)
    }

    fn carve(&mut self, block: Block, block_size: usize) -> Result<usize> {
        let remainder = block.size - block_size;

        // remainders below the tag overhead cannot form a block of their own
        let used = if remainder >= BLOCK_OVERHEAD {
            self.write_tags(block.offset + block_size, remainder, false)?;
            block_size
        } else {
            block.size
        };

        self.write_tags(block.offset, used, true)?;
        let payload = block.offset + TAG_SIZE;
        self.data[payload..block.offset + used - TAG_SIZE].fill(0);
        Ok(payload)
    }
}
