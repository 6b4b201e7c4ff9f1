//! # Introduction
//!
//! `memattr` programs x86 memory-type range registers and splits
//! page-table entries, the two "paint a region with finer-grained
//! attributes" problems early firmware has to solve.
//!
//! The range-register side converts the sparse, possibly overlapping set
//! of typed ranges implied by the register file into one canonical,
//! gapless partition of the physical address space, folds attribute
//! requests into it, and re-encodes the result as power-of-two aligned
//! base/mask pairs under the hardware's register budget. The paging side
//! replaces a large page-table leaf with a table of smaller leaves so a
//! single 4KB page (a stack guard, typically) can be unmapped on its own.
//!
//! # Getting started
//!
//! ```ignore
//! use memattr::structs::CacheType;
//!
//! // Hardware-backed engine, no registers held back for the OS.
//! let mut engine = memattr::create_engine(0);
//!
//! // Make the 32-bit MMIO aperture uncacheable.
//! engine.set_memory_attribute(0xB000_0000, 0x5000_0000, CacheType::Uncacheable)?;
//!
//! // Decode the register file back into ranges.
//! for range in engine.memory_ranges()? {
//!     // ...
//! }
//! ```
//!
//! Everything reaches the processor through [`hal::HalTrait`], so tests
//! drive the same algorithms against an emulated register file, and the
//! page-table splitter reaches memory through
//! [`paging::PageTableMemory`], an arena of 4KB pages.

#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]
extern crate alloc;

pub mod engine;
pub mod error;
pub mod hal;
pub mod paging;
pub mod ranges;
pub mod structs;
mod utils;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub mod reg;

        /// Engine over the live processor registers.
        ///
        /// `reserved_variable_registers` is the number of variable pairs
        /// the platform keeps back for the OS.
        pub fn create_engine(reserved_variable_registers: u32) -> engine::MemTypeEngine<hal::X64Hal> {
            engine::MemTypeEngine::new(hal::X64Hal::new(reserved_variable_registers))
        }
    }
}

pub use engine::MemTypeEngine;
pub use error::{MemAttrError, MemAttrResult};
