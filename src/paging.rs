//! Page-table entry splitting for guard-page painting.
//!
//! A large leaf entry is replaced, one level at a time, by a freshly
//! allocated table of 512 smaller leaves covering the same span, so a
//! single 4KB page can be given its own attributes. The tree is reached
//! through [`PageTableMemory`], so tests run against an arena of simulated
//! physical pages and a hardware build can back it with raw access.

use bitfield_struct::bitfield;

use crate::error::{MemAttrError, MemAttrResult};

pub const ENTRIES_PER_TABLE: u64 = 512;

const SIZE_4KB: u64 = 0x1000;
const SIZE_4GB: u64 = 1 << 32;
const PHYS_ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// Access to page-table pages by physical address.
pub trait PageTableMemory {
    fn read_u64(&self, address: u64) -> u64;

    fn write_u64(&mut self, address: u64, value: u64);

    /// A fresh 4KB, zero-filled, physically addressable page, or `None`
    /// when the allocator is exhausted.
    fn allocate_zeroed_page(&mut self) -> Option<u64>;
}

/// Active paging structure shape: PAE (3-level, 4-entry top table of 1GB
/// entries) or 4-level (512-entry top table of 512GB entries).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingMode {
    Pae,
    FourLevel,
}

/// Leaf granularities, smallest to largest. Splits only move downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PageSize {
    Size4K,
    Size2M,
    Size1G,
    Size512G,
}

impl PageSize {
    pub fn bytes(self) -> u64 {
        match self {
            PageSize::Size4K => 0x1000,
            PageSize::Size2M => 0x20_0000,
            PageSize::Size1G => 0x4000_0000,
            PageSize::Size512G => 0x80_0000_0000,
        }
    }

    /// The next granularity down; `None` at the leaf level.
    pub fn child(self) -> Option<PageSize> {
        match self {
            PageSize::Size4K => None,
            PageSize::Size2M => Some(PageSize::Size4K),
            PageSize::Size1G => Some(PageSize::Size2M),
            PageSize::Size512G => Some(PageSize::Size1G),
        }
    }

    fn index_shift(self) -> u32 {
        match self {
            PageSize::Size4K => 12,
            PageSize::Size2M => 21,
            PageSize::Size1G => 30,
            PageSize::Size512G => 39,
        }
    }
}

/// A 64-bit page-table entry, any level.
///
/// The page-size flag is meaningful in directory-level entries; in this
/// model every non-4K leaf carries it, including the PAE top level, so a
/// walk can tell leaves from table pointers uniformly.
#[bitfield(u64)]
pub struct PageTableEntry {
    pub present: bool, // bit 0
    pub writable: bool, // bit 1
    pub user: bool, // bit 2
    pub write_through: bool, // bit 3
    pub cache_disable: bool, // bit 4
    pub accessed: bool, // bit 5
    pub dirty: bool, // bit 6
    pub page_size: bool, // bit 7
    pub global: bool, // bit 8
    #[bits(3)]
    pub avail_lo: u8, // bits 9-11
    #[bits(40)]
    pub frame: u64, // bits 12-51
    #[bits(11)]
    pub avail_hi: u16, // bits 52-62
    pub no_execute: bool, // bit 63
}

// Attribute bits copied verbatim from a split entry into its children.
// Present and writable are recomputed; the encryption mask rides in the
// address field and is reapplied separately.
const PROPAGATE_MASK: u64 = PageTableEntry::new()
    .with_user(true)
    .with_accessed(true)
    .with_dirty(true)
    .with_no_execute(true)
    .into_bits();

/// One page-table tree and the memory it lives in.
pub struct PageTables<M: PageTableMemory> {
    memory: M,
    root: u64,
    mode: PagingMode,
    enc_mask: u64,
}

impl<M: PageTableMemory> PageTables<M> {
    /// `root` is the CR3-equivalent value; `enc_mask` is the memory
    /// encryption address mask to stamp into every entry (0 when memory
    /// encryption is off).
    pub fn new(memory: M, root: u64, mode: PagingMode, enc_mask: u64) -> Self {
        Self { memory, root, mode, enc_mask }
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn into_memory(self) -> M {
        self.memory
    }

    fn top_level_size(&self) -> PageSize {
        match self.mode {
            PagingMode::Pae => PageSize::Size1G,
            PagingMode::FourLevel => PageSize::Size512G,
        }
    }

    /// Walk from the root to the entry currently mapping `address`.
    /// Returns the entry's physical location and its granularity, or
    /// `None` when the address is unmapped.
    pub fn find_entry(&self, address: u64) -> Option<(u64, PageSize)> {
        let mut table = self.root & PHYS_ADDR_MASK & !self.enc_mask;
        let mut size = self.top_level_size();

        loop {
            let index_mask = if self.mode == PagingMode::Pae && size == PageSize::Size1G {
                0x3
            } else {
                ENTRIES_PER_TABLE - 1
            };
            let index = (address >> size.index_shift()) & index_mask;
            let entry_address = table + index * 8;
            let entry = PageTableEntry::from_bits(self.memory.read_u64(entry_address));

            if !entry.present() {
                return None;
            }
            if size == PageSize::Size4K || entry.page_size() {
                return Some((entry_address, size));
            }

            table = (entry.into_bits() & PHYS_ADDR_MASK) & !self.enc_mask;
            size = size.child().expect("4K entries never point to tables");
        }
    }

    /// Replace the leaf entry at `entry_address` with a pointer to a new
    /// table of 512 children one level down, preserving the propagated
    /// attribute bits. With `recursive`, children are split further until
    /// `target` is reached.
    pub fn split_entry(
        &mut self,
        entry_address: u64,
        current: PageSize,
        target: PageSize,
        recursive: bool,
    ) -> MemAttrResult<()> {
        if target >= current {
            return Err(MemAttrError::InvalidParameter);
        }
        let child_size = current.child().expect("current size is above 4K");

        let parent = PageTableEntry::from_bits(self.memory.read_u64(entry_address));
        debug_assert!(parent.present());
        let parent_base = parent.into_bits() & PHYS_ADDR_MASK & !(current.bytes() - 1) & !self.enc_mask;

        let table = self.memory.allocate_zeroed_page().ok_or(MemAttrError::OutOfResources)?;

        // The PAE top-level entry format reserves the writable and user
        // bits; they must not leak into the children.
        let pae_top = self.mode == PagingMode::Pae && current == PageSize::Size1G;

        for index in 0..ENTRIES_PER_TABLE {
            // Present and writable are recomputed from the parent's
            // effective permissions rather than copied with the rest, so a
            // PAE-forced clear sticks through further splits.
            let mut child = PageTableEntry::from_bits(parent.into_bits() & PROPAGATE_MASK)
                .with_present(true)
                .with_writable(parent.writable());
            if pae_top {
                child.set_writable(false);
                child.set_user(false);
            }
            if child_size != PageSize::Size4K {
                child.set_page_size(true);
            }
            let child_base = parent_base + index * child_size.bytes();
            let value = child.into_bits() | child_base | self.enc_mask;
            self.memory.write_u64(table + index * 8, value);
        }

        if recursive && child_size > target {
            for index in 0..ENTRIES_PER_TABLE {
                self.split_entry(table + index * 8, child_size, target, true)?;
            }
        }

        let pointer = PageTableEntry::new().with_present(true).with_writable(true);
        self.memory
            .write_u64(entry_address, pointer.into_bits() | table | self.enc_mask);

        Ok(())
    }

    /// Map or unmap `[base_address, base_address + length)` page by page,
    /// splitting any coarser entry down to 4KB first. This is the
    /// guard-page primitive: clearing `present` un-maps the page.
    pub fn set_present(&mut self, base_address: u64, length: u64, present: bool) -> MemAttrResult<()> {
        if length == 0
            || base_address & (SIZE_4KB - 1) != 0
            || length & (SIZE_4KB - 1) != 0
        {
            return Err(MemAttrError::InvalidParameter);
        }
        if base_address + length > SIZE_4GB {
            return Err(MemAttrError::Unsupported);
        }

        let mut address = base_address;
        let mut remaining = length;
        while remaining != 0 {
            let (mut entry_address, mut size) =
                self.find_entry(address).ok_or(MemAttrError::Unsupported)?;

            // One level per pass; the fresh children are leaves, so the
            // next lookup lands one level further down.
            while size != PageSize::Size4K {
                self.split_entry(entry_address, size, PageSize::Size4K, false)?;
                let found = self.find_entry(address).ok_or(MemAttrError::Unsupported)?;
                entry_address = found.0;
                size = found.1;
            }

            let entry = PageTableEntry::from_bits(self.memory.read_u64(entry_address)).with_present(present);
            self.memory.write_u64(entry_address, entry.into_bits());

            address += SIZE_4KB;
            remaining -= SIZE_4KB;
        }

        Ok(())
    }
}
