//! Variable/fixed range-register codec.
//!
//! The engine decodes the live register file into a canonical partition,
//! folds attribute requests into it with the range algebra, re-encodes the
//! partition into base/mask pairs with a greedy maximal-aligned-block
//! decomposition, and programs the registers under the cache-disable
//! bracket the architecture requires.

use alloc::vec::Vec;

use crate::error::{MemAttrError, MemAttrResult};
use crate::hal::HalTrait;
use crate::ranges;
use crate::structs::AddressSizeEax;
use crate::structs::CacheType;
use crate::structs::CapabilityRegister;
use crate::structs::DefaultTypeRegister;
use crate::structs::FeatureFlagsEcx;
use crate::structs::FixedRegisters;
use crate::structs::MemoryRange;
use crate::structs::PhysBaseRegister;
use crate::structs::PhysMaskRegister;
use crate::structs::ProgramContext;
use crate::structs::RegisterSnapshot;
use crate::structs::SystemParameters;
use crate::structs::TmeActivateRegister;
use crate::structs::VariablePair;
use crate::structs::VariableRegisters;
use crate::structs::VersionInfoEdx;
use crate::structs::CACHE_TYPE_SHORT_NAME;
use crate::structs::CLEAR_SEED;
use crate::structs::CPUID_EXTENDED_FUNCTION;
use crate::structs::CPUID_SIGNATURE;
use crate::structs::CPUID_STRUCTURED_EXTENDED_FEATURE_FLAGS;
use crate::structs::CPUID_VERSION_INFO;
use crate::structs::CPUID_VIR_PHY_ADDRESS_SIZE;
use crate::structs::FIXED_RANGE_COUNT;
use crate::structs::FIXED_RANGE_TABLE;
use crate::structs::MAX_VARIABLE_RANGES;
use crate::structs::MSR_DEF_TYPE;
use crate::structs::MSR_MTRRCAP;
use crate::structs::MSR_PHYSBASE0;
use crate::structs::MSR_PHYSMASK0;
use crate::structs::MSR_TME_ACTIVATE;
use crate::structs::OR_SEED;
use crate::structs::SIZE_1MB;
use crate::utils::{biggest_alignment, floor_pow2, high_bit, is_pow2};

const CR4_PGE: u64 = 1 << 7;
const SIZE_4KB_MASK: u64 = 0xFFF;
const MASK_VALID: u64 = 1 << 11;

pub struct MemTypeEngine<H: HalTrait> {
    hal: H,
}

impl<H: HalTrait> MemTypeEngine<H> {
    pub fn new(hal: H) -> Self {
        Self { hal }
    }

    /// Whether range registers exist at all: CPUID.01H:EDX[12], plus a
    /// non-empty capability register (either fixed support or a non-zero
    /// variable count).
    fn probe_support(&mut self) -> MemAttrResult<(bool, u32)> {
        let edx = VersionInfoEdx::from_bits(self.hal.cpuid(CPUID_VERSION_INFO).edx);
        if !edx.mtrr() {
            return Err(MemAttrError::Unsupported);
        }

        let cap = CapabilityRegister::from_bits(self.hal.read_msr64(MSR_MTRRCAP) as u32);
        let variable_count = cap.vcnt() as u32;
        assert!(variable_count <= MAX_VARIABLE_RANGES as u32);

        if variable_count == 0 && !cap.fix() {
            return Err(MemAttrError::Unsupported);
        }

        Ok((cap.fix(), variable_count))
    }

    pub fn is_supported(&mut self) -> bool {
        self.probe_support().is_ok()
    }

    /// Number of variable range register pairs, 0 when unsupported.
    pub fn variable_register_count(&mut self) -> u32 {
        match self.probe_support() {
            Ok((_, variable_count)) => variable_count,
            Err(_) => 0,
        }
    }

    /// Variable pairs the engine may program: the hardware count minus the
    /// platform's reserved headroom.
    pub fn usable_variable_register_count(&mut self) -> u32 {
        let variable_count = self.variable_register_count();
        let reserved = self.hal.reserved_variable_register_count();
        if variable_count < reserved {
            return 0;
        }
        variable_count - reserved
    }

    /// The default type programmed in the default-type register.
    pub fn default_cache_type(&mut self) -> CacheType {
        if !self.is_supported() {
            return CacheType::Uncacheable;
        }
        let def = DefaultTypeRegister::from_bits(self.hal.read_msr64(MSR_DEF_TYPE));
        CacheType::from(def.mem_type())
    }

    /// Valid-bits mask and valid-address mask for the physical address
    /// width. MKTME key-ID bits are carved out of the CPUID-reported width
    /// when total memory encryption is active.
    fn address_masks(&mut self) -> (u64, u64) {
        let mut physical_address_bits = 36u8;

        let max_extended_function = self.hal.cpuid(CPUID_EXTENDED_FUNCTION).eax;
        if max_extended_function >= CPUID_VIR_PHY_ADDRESS_SIZE {
            let eax = AddressSizeEax::from_bits(self.hal.cpuid(CPUID_VIR_PHY_ADDRESS_SIZE).eax);
            physical_address_bits = eax.physical_address_bits();
        }

        let max_function = self.hal.cpuid(CPUID_SIGNATURE).eax;
        if max_function >= CPUID_STRUCTURED_EXTENDED_FEATURE_FLAGS {
            let ecx =
                FeatureFlagsEcx::from_bits(self.hal.cpuid_ex(CPUID_STRUCTURED_EXTENDED_FEATURE_FLAGS, 0).ecx);
            if ecx.tme_en() {
                let tme = TmeActivateRegister::from_bits(self.hal.read_msr64(MSR_TME_ACTIVATE));
                if tme.tme_enable() {
                    physical_address_bits -= tme.mk_tme_keyid_bits();
                }
            }
        }

        let valid_bits_mask = (1u64 << physical_address_bits) - 1;
        let valid_address_mask = valid_bits_mask & 0xFFFF_FFFF_FFFF_F000;
        (valid_bits_mask, valid_address_mask)
    }

    /// Capability summary, assembled once from the discovery registers.
    pub fn system_parameters(&mut self) -> MemAttrResult<SystemParameters> {
        let (fixed_registers_supported, variable_register_count) = self.probe_support()?;
        let (valid_bits_mask, _) = self.address_masks();
        Ok(SystemParameters {
            physical_address_bits: (high_bit(valid_bits_mask) + 1) as u8,
            variable_register_count,
            fixed_registers_supported,
            default_type: self.default_cache_type(),
        })
    }

    fn read_variable_pairs(&mut self, variable_count: u32) -> VariableRegisters {
        assert!(variable_count <= MAX_VARIABLE_RANGES as u32);

        let mut variable = VariableRegisters::default();
        for index in 0..variable_count as usize {
            let base_msr = MSR_PHYSBASE0 + (index as u32 * 2);
            let mask_msr = MSR_PHYSMASK0 + (index as u32 * 2);
            variable.pairs[index].base = self.hal.read_msr64(base_msr);
            variable.pairs[index].mask = self.hal.read_msr64(mask_msr);
        }
        variable
    }

    /// Reconstruct one raw range per valid pair. No overlap removal, no
    /// coalescing; that is the range algebra's job.
    fn decode_variable_ranges(
        variable: &VariableRegisters,
        variable_count: usize,
        valid_bits_mask: u64,
        valid_address_mask: u64,
    ) -> Vec<MemoryRange> {
        let mut raw = Vec::with_capacity(variable_count);
        for pair in variable.pairs.iter().take(variable_count) {
            if !PhysMaskRegister::from_bits(pair.mask).v() {
                continue;
            }
            raw.push(MemoryRange {
                base_address: pair.base & valid_address_mask,
                length: (!(pair.mask & valid_address_mask) & valid_bits_mask) + 1,
                cache_type: CacheType::from(PhysBaseRegister::from_bits(pair.base).mem_type()),
            });
        }
        raw
    }

    /// Decode the whole register file into the canonical partition: valid
    /// variable pairs through the range algebra, then the fixed segments
    /// painted over [0, 1MB) when fixed ranges are enabled.
    pub fn memory_ranges(&mut self) -> MemAttrResult<Vec<MemoryRange>> {
        let (fixed_supported, variable_count) = self.probe_support()?;
        let (valid_bits_mask, valid_address_mask) = self.address_masks();
        let address_bits = high_bit(valid_bits_mask) + 1;

        let def = DefaultTypeRegister::from_bits(self.hal.read_msr64(MSR_DEF_TYPE));
        assert!(fixed_supported || !def.fe());
        if !def.e() {
            return Ok(alloc::vec![MemoryRange::new(
                0,
                valid_bits_mask + 1,
                CacheType::Uncacheable
            )]);
        }

        let variable = self.read_variable_pairs(variable_count);
        let raw = Self::decode_variable_ranges(
            &variable,
            variable_count as usize,
            valid_bits_mask,
            valid_address_mask,
        );
        let default_type = CacheType::from(def.mem_type());
        let mut partition = ranges::effective_ranges(default_type, address_bits, &raw);

        if def.fe() {
            let mut segment_base = 0u64;
            for entry in FIXED_RANGE_TABLE.iter() {
                let value = self.hal.read_msr64(entry.msr);
                for lane in 0..8 {
                    let cache_type = CacheType::from(((value >> (lane * 8)) & 0xFF) as u8);
                    ranges::set_range_type(
                        &mut partition,
                        segment_base,
                        entry.segment_length as u64,
                        cache_type,
                    );
                    segment_base += entry.segment_length as u64;
                }
            }
            assert_eq!(segment_base, SIZE_1MB);
        }

        Ok(partition)
    }

    /// Memory type in effect at a single address.
    pub fn memory_attribute_at(&mut self, address: u64) -> CacheType {
        let Ok((fixed_supported, variable_count)) = self.probe_support() else {
            return CacheType::Uncacheable;
        };

        let def = DefaultTypeRegister::from_bits(self.hal.read_msr64(MSR_DEF_TYPE));
        if !def.e() {
            return CacheType::Uncacheable;
        }

        if address < SIZE_1MB && fixed_supported && def.fe() {
            for entry in FIXED_RANGE_TABLE.iter() {
                let segment_limit = entry.base_address as u64 + 8 * entry.segment_length as u64;
                if address >= entry.base_address as u64 && address < segment_limit {
                    let lane = (address - entry.base_address as u64) / entry.segment_length as u64;
                    let value = self.hal.read_msr64(entry.msr);
                    return CacheType::from(((value >> (lane * 8)) & 0xFF) as u8);
                }
            }
        }

        let (valid_bits_mask, valid_address_mask) = self.address_masks();
        let variable = self.read_variable_pairs(variable_count);
        let raw = Self::decode_variable_ranges(
            &variable,
            variable_count as usize,
            valid_bits_mask,
            valid_address_mask,
        );

        let mut cache_type = CacheType::Invalid;
        for range in raw.iter().filter(|range| range.contains(address)) {
            cache_type = cache_type.precedent(range.cache_type);
        }
        if cache_type == CacheType::Invalid {
            cache_type = CacheType::from(def.mem_type());
        }
        cache_type
    }

    /// Greedy maximal-aligned-block decomposition of every non-default
    /// range in a canonical partition. Each block's size is a power of two
    /// and its base is aligned to it, so each block fits one base/mask
    /// pair. Blocks come out in ascending base order.
    fn encode_variable_ranges(
        default_type: CacheType,
        alignment0: u64,
        partition: &[MemoryRange],
        capacity: usize,
    ) -> MemAttrResult<Vec<MemoryRange>> {
        let mut blocks: Vec<MemoryRange> = Vec::new();

        for range in partition.iter().filter(|range| range.cache_type != default_type) {
            let mut base = range.base_address;
            let mut remaining = range.length;
            while remaining != 0 {
                let block = core::cmp::min(biggest_alignment(base, alignment0), floor_pow2(remaining));
                debug_assert!(is_pow2(block) && base & (block - 1) == 0);
                if blocks.len() == capacity {
                    return Err(MemAttrError::RegistersExhausted);
                }
                log::trace!(
                    "encode: {:?} block [{:#x}, {:#x})",
                    range.cache_type,
                    base,
                    base + block
                );
                blocks.push(MemoryRange::new(base, block, range.cache_type));
                base += block;
                remaining -= block;
            }
        }

        Ok(blocks)
    }

    /// Byte-lane clear/or masks for one sub-1MB request against the fixed
    /// register file. Walks the fixed table one register at a time; a base
    /// or length that does not land on the register's segment size cannot
    /// be expressed and fails.
    fn fixed_masks_for_range(
        clear_masks: &mut [u64; FIXED_RANGE_COUNT],
        or_masks: &mut [u64; FIXED_RANGE_COUNT],
        mut base_address: u64,
        mut length: u64,
        cache_type: CacheType,
    ) -> MemAttrResult<()> {
        assert!(base_address < SIZE_1MB);

        while base_address < SIZE_1MB && length != 0 {
            let index = FIXED_RANGE_TABLE
                .iter()
                .position(|entry| {
                    base_address >= entry.base_address as u64
                        && base_address < entry.base_address as u64 + 8 * entry.segment_length as u64
                })
                .expect("fixed table covers [0, 1MB)");
            let entry = &FIXED_RANGE_TABLE[index];
            let segment = entry.segment_length as u64;

            if (base_address - entry.base_address as u64) % segment != 0 {
                return Err(MemAttrError::Unsupported);
            }

            let left_shift = (base_address - entry.base_address as u64) / segment;
            assert!(left_shift < 8);

            let mut sub_length = segment * (8 - left_shift);
            let right_shift;
            if length >= sub_length {
                right_shift = 0;
            } else {
                if length % segment != 0 {
                    return Err(MemAttrError::Unsupported);
                }
                right_shift = 8 - left_shift - length / segment;
                sub_length = length;
            }

            let mut clear_mask = CLEAR_SEED;
            let mut or_mask = OR_SEED * cache_type as u64;
            if left_shift != 0 {
                clear_mask &= clear_mask << (left_shift * 8);
                or_mask &= or_mask << (left_shift * 8);
            }
            if right_shift != 0 {
                clear_mask &= clear_mask >> (right_shift * 8);
                or_mask &= or_mask >> (right_shift * 8);
            }

            clear_masks[index] |= clear_mask;
            or_masks[index] = (or_masks[index] & !clear_mask) | or_mask;

            base_address += sub_length;
            length -= sub_length;
        }

        Ok(())
    }

    /// Disable caching and range registers around a programming sequence:
    /// interrupts off, no-fill cache mode, CR4.PGE cleared, TLBs flushed,
    /// default-type register saved with the enable bit cleared.
    fn begin_programming(&mut self, context: &mut ProgramContext) {
        context.interrupt_state = self.hal.save_and_disable_interrupts();
        self.hal.disable_cache();

        context.cr4 = self.hal.read_cr4();
        self.hal.write_cr4(context.cr4 & !CR4_PGE);
        self.hal.flush_tlb();

        context.default_type = DefaultTypeRegister::from_bits(self.hal.read_msr64(MSR_DEF_TYPE));
        let disabled = DefaultTypeRegister::new()
            .with_mem_type(context.default_type.mem_type())
            .with_e(false);
        self.hal.write_msr64(MSR_DEF_TYPE, disabled.into_bits());
    }

    /// Restore caching after programming, leaving whatever default-type
    /// value the caller wrote in place.
    fn end_programming_keep_default(&mut self, context: &ProgramContext) {
        self.hal.flush_tlb();
        self.hal.enable_cache();
        self.hal.write_cr4(context.cr4);
        self.hal.set_interrupt_state(context.interrupt_state);
    }

    /// Re-enable range registers and restore caching.
    fn end_programming(&mut self, context: &mut ProgramContext) {
        // The enable bit is set unconditionally even if it was clear on
        // entry; programming attributes implies using them.
        context.default_type.set_e(true);
        self.hal.write_msr64(MSR_DEF_TYPE, context.default_type.into_bits());
        self.end_programming_keep_default(context);
    }

    /// Set one range to one type, merging the request with the decoded
    /// current state.
    pub fn set_memory_attribute(
        &mut self,
        base_address: u64,
        length: u64,
        cache_type: CacheType,
    ) -> MemAttrResult<()> {
        let request = [MemoryRange::new(base_address, length, cache_type)];
        self.apply_ranges(&request, true)
    }

    /// Program the register file to express `target` exactly. The caller
    /// supplies the complete desired canonical partition; no merge with
    /// the current state happens.
    pub fn set_memory_ranges(&mut self, target: &[MemoryRange]) -> MemAttrResult<()> {
        self.apply_ranges(target, false)
    }

    fn apply_ranges(&mut self, requests: &[MemoryRange], merge_with_current: bool) -> MemAttrResult<()> {
        let (fixed_supported, variable_count) = self.probe_support()?;
        let (valid_bits_mask, valid_address_mask) = self.address_masks();
        let address_bits = high_bit(valid_bits_mask) + 1;
        let fixed_limit = if fixed_supported { SIZE_1MB } else { 0 };

        log::debug!("set attributes, {} range(s):", requests.len());
        for range in requests {
            log::debug!(
                "  {:?} [{:#016x}, {:#016x})",
                range.cache_type,
                range.base_address,
                range.base_address + range.length
            );
        }

        for range in requests {
            if range.length == 0 || !range.cache_type.is_programmable() {
                return Err(MemAttrError::InvalidParameter);
            }
            if range.base_address & SIZE_4KB_MASK != 0 || range.length & SIZE_4KB_MASK != 0 {
                return Err(MemAttrError::InvalidParameter);
            }
            if range.base_address + range.length > valid_bits_mask + 1 {
                return Err(MemAttrError::Unsupported);
            }
        }

        let variable_needed = !merge_with_current
            || requests.iter().any(|range| range.base_address + range.length > fixed_limit);

        let current_variable = self.read_variable_pairs(variable_count);
        let mut desired_blocks: Option<Vec<MemoryRange>> = None;

        if variable_needed {
            let default_type = self.default_cache_type();

            let (mut partition, mut modified) = if merge_with_current {
                let raw = Self::decode_variable_ranges(
                    &current_variable,
                    variable_count as usize,
                    valid_bits_mask,
                    valid_address_mask,
                );
                (ranges::effective_ranges(default_type, address_bits, &raw), false)
            } else {
                // The caller's target must itself be a canonical partition.
                let mut expected_base = 0u64;
                for range in requests {
                    if range.base_address != expected_base {
                        return Err(MemAttrError::InvalidParameter);
                    }
                    expected_base += range.length;
                }
                if expected_base != valid_bits_mask + 1 {
                    return Err(MemAttrError::InvalidParameter);
                }
                (requests.to_vec(), true)
            };

            // Pin [0, 1MB) to Uncacheable while computing so the encoder
            // never spends a variable pair below the fixed-range window.
            if fixed_limit != 0 {
                ranges::set_range_type(&mut partition, 0, fixed_limit, CacheType::Uncacheable);
            }

            if merge_with_current {
                for range in requests {
                    let mut base_address = range.base_address;
                    let mut length = range.length;
                    if base_address < fixed_limit {
                        if length <= fixed_limit - base_address {
                            continue;
                        }
                        length -= fixed_limit - base_address;
                        base_address = fixed_limit;
                    }
                    if ranges::set_range_type(&mut partition, base_address, length, range.cache_type) {
                        modified = true;
                    }
                }
            }

            if modified {
                let alignment0 = 1u64 << high_bit(valid_bits_mask);
                let budget = self.usable_variable_register_count() as usize;

                // One block of headroom for the synthetic [0, 1MB) pair;
                // it is dropped before the budget check.
                let mut blocks =
                    Self::encode_variable_ranges(default_type, alignment0, &partition, budget + 1)?;
                if fixed_limit != 0 {
                    blocks.retain(|block| {
                        !(block.base_address == 0
                            && block.length == fixed_limit
                            && block.cache_type == CacheType::Uncacheable)
                    });
                }
                if blocks.len() > budget {
                    return Err(MemAttrError::RegistersExhausted);
                }
                desired_blocks = Some(blocks);
            }
        }

        let mut context = ProgramContext::default();
        let mut context_open = false;

        // Fixed registers first: byte-lane read-modify-write of every MSR
        // a sub-1MB request touches.
        if fixed_limit != 0 {
            let mut clear_masks = [0u64; FIXED_RANGE_COUNT];
            let mut or_masks = [0u64; FIXED_RANGE_COUNT];
            for range in requests.iter().filter(|range| range.base_address < fixed_limit) {
                Self::fixed_masks_for_range(
                    &mut clear_masks,
                    &mut or_masks,
                    range.base_address,
                    range.length,
                    range.cache_type,
                )?;
            }

            for (index, &clear_mask) in clear_masks.iter().enumerate() {
                if clear_mask != 0 {
                    if !context_open {
                        self.begin_programming(&mut context);
                        context.default_type.set_fe(true);
                        context_open = true;
                    }
                    self.hal.msr_and_then_or_64(
                        FIXED_RANGE_TABLE[index].msr,
                        !clear_mask,
                        or_masks[index],
                    );
                }
            }
        }

        // Variable pairs next, ascending base order from register 0; every
        // remaining pair is invalidated. Unchanged pairs are not rewritten.
        if let Some(blocks) = desired_blocks {
            debug_assert!(blocks.windows(2).all(|pair| pair[0].base_address < pair[1].base_address));

            for index in 0..variable_count as usize {
                let desired = match blocks.get(index) {
                    Some(block) => VariablePair {
                        base: (block.base_address & valid_address_mask) | block.cache_type as u64,
                        mask: (!(block.length - 1) & valid_address_mask) | MASK_VALID,
                    },
                    None => VariablePair::default(),
                };

                if current_variable.pairs[index] != desired {
                    if !context_open {
                        self.begin_programming(&mut context);
                        context_open = true;
                    }
                    self.hal.write_msr64(MSR_PHYSBASE0 + (index as u32 * 2), desired.base);
                    self.hal.write_msr64(MSR_PHYSMASK0 + (index as u32 * 2), desired.mask);
                }
            }
        }

        if context_open {
            self.end_programming(&mut context);
        }

        self.log_registers();
        Ok(())
    }

    /// Image of the whole register file.
    pub fn register_snapshot(&mut self) -> RegisterSnapshot {
        let mut snapshot = RegisterSnapshot::default();

        let Ok((fixed_supported, variable_count)) = self.probe_support() else {
            return snapshot;
        };

        let def = DefaultTypeRegister::from_bits(self.hal.read_msr64(MSR_DEF_TYPE));
        assert!(fixed_supported || !def.fe());
        snapshot.default_type = def;

        if def.fe() {
            for (index, entry) in FIXED_RANGE_TABLE.iter().enumerate() {
                snapshot.fixed.msrs[index] = self.hal.read_msr64(entry.msr);
            }
        }

        snapshot.variable = self.read_variable_pairs(variable_count);
        snapshot
    }

    /// Program everything in `snapshot` back into the register file. The
    /// registers may stay disabled afterwards if the snapshot's enable bit
    /// is clear.
    pub fn apply_snapshot(&mut self, snapshot: &RegisterSnapshot) {
        let Ok((fixed_supported, variable_count)) = self.probe_support() else {
            return;
        };
        assert!(fixed_supported || !snapshot.default_type.fe());

        let mut context = ProgramContext::default();
        self.begin_programming(&mut context);

        if fixed_supported {
            self.write_fixed_registers(&snapshot.fixed);
        }
        for index in 0..variable_count as usize {
            self.hal
                .write_msr64(MSR_PHYSBASE0 + (index as u32 * 2), snapshot.variable.pairs[index].base);
            self.hal
                .write_msr64(MSR_PHYSMASK0 + (index as u32 * 2), snapshot.variable.pairs[index].mask);
        }
        self.hal.write_msr64(MSR_DEF_TYPE, snapshot.default_type.into_bits());

        self.end_programming_keep_default(&context);
    }

    fn write_fixed_registers(&mut self, fixed: &FixedRegisters) {
        for (index, entry) in FIXED_RANGE_TABLE.iter().enumerate() {
            self.hal.write_msr64(entry.msr, fixed.msrs[index]);
        }
    }

    /// Dump the raw register file and the decoded partition to the log.
    pub fn log_registers(&mut self) {
        let Ok(partition) = self.memory_ranges() else {
            log::info!("range registers not enabled");
            return;
        };
        let snapshot = self.register_snapshot();

        log::debug!("default type register: {:#016x}", snapshot.default_type.into_bits());
        for (index, value) in snapshot.fixed.msrs.iter().enumerate() {
            log::debug!("fixed[{:02}]: {:#018x}", index, value);
        }
        for (index, pair) in snapshot.variable.pairs.iter().enumerate() {
            if pair.mask & MASK_VALID != 0 {
                log::debug!("variable[{:02}]: base={:#016x} mask={:#016x}", index, pair.base, pair.mask);
            }
        }
        for range in partition {
            log::info!(
                "{}: {:#016x}-{:#016x}",
                CACHE_TYPE_SHORT_NAME[range.cache_type as usize],
                range.base_address,
                range.base_address + range.length - 1
            );
        }
    }

    /// Consume the engine and hand the HAL back, for callers that layered
    /// their own state into it.
    pub fn into_hal(self) -> H {
        self.hal
    }
}
