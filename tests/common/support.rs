//! Random range-register generation and decode-side result collection.

use memattr::ranges;
use memattr::structs::{CacheType, MemoryRange, RegisterSnapshot, VariablePair};
use rand::rngs::StdRng;
use rand::Rng;

const SIZE_1MB: u64 = 0x10_0000;
const MASK_VALID: u64 = 1 << 11;

pub fn random_cache_type(rng: &mut StdRng) -> CacheType {
    const TYPES: [CacheType; 5] = [
        CacheType::Uncacheable,
        CacheType::WriteCombining,
        CacheType::WriteThrough,
        CacheType::WriteProtected,
        CacheType::WriteBack,
    ];
    TYPES[rng.gen_range(0..TYPES.len())]
}

/// Split `total` register pairs randomly across UC/WT/WB/WP/WC.
pub fn random_type_split(rng: &mut StdRng, total: u32) -> [u32; 5] {
    let mut counts = [0u32; 5];
    let picked = rng.gen_range(1..=total);
    for _ in 0..picked {
        counts[rng.gen_range(0..counts.len())] += 1;
    }
    counts
}

/// One register-expressible range: power-of-two size, base aligned to the
/// size, landing at or above 1MB.
pub fn random_aligned_range(
    rng: &mut StdRng,
    physical_address_bits: u32,
    cache_type: CacheType,
) -> MemoryRange {
    let max_address = 1u64 << physical_address_bits;
    loop {
        let size_shift = rng.gen_range(12..physical_address_bits);
        let length = 1u64 << size_shift;
        let base_shift = rng.gen_range(size_shift..physical_address_bits);
        let boundary = rng.gen_range(0..(1u64 << (physical_address_bits - base_shift)));
        let base_address = boundary << base_shift;

        if base_address >= SIZE_1MB && base_address <= max_address - 1 {
            return MemoryRange::new(base_address, length, cache_type);
        }
    }
}

pub fn ranges_overlap(range: &MemoryRange, others: &[MemoryRange]) -> bool {
    others.iter().any(|other| {
        (range.base_address <= other.base_address
            && other.base_address < range.base_address + range.length)
            || (other.base_address <= range.base_address
                && range.base_address < other.base_address + other.length)
    })
}

/// Random register-expressible ranges per type count. UC, WT and WB land
/// anywhere; WP avoids WT/WB and WC avoids WT/WB/WP, because the hardware
/// leaves those overlaps undefined.
pub fn random_register_ranges(
    rng: &mut StdRng,
    physical_address_bits: u32,
    counts: [u32; 5],
) -> Vec<MemoryRange> {
    let [uc, wt, wb, wp, wc] = counts;
    let mut raw: Vec<MemoryRange> = Vec::new();

    for _ in 0..uc {
        raw.push(random_aligned_range(rng, physical_address_bits, CacheType::Uncacheable));
    }
    for _ in 0..wt {
        raw.push(random_aligned_range(rng, physical_address_bits, CacheType::WriteThrough));
    }
    for _ in 0..wb {
        raw.push(random_aligned_range(rng, physical_address_bits, CacheType::WriteBack));
    }

    for _ in 0..wp {
        let constrained_from = uc as usize;
        loop {
            let candidate = random_aligned_range(rng, physical_address_bits, CacheType::WriteProtected);
            if !ranges_overlap(&candidate, &raw[constrained_from..]) {
                raw.push(candidate);
                break;
            }
        }
    }

    for _ in 0..wc {
        let constrained_from = uc as usize;
        loop {
            let candidate = random_aligned_range(rng, physical_address_bits, CacheType::WriteCombining);
            if !ranges_overlap(&candidate, &raw[constrained_from..]) {
                raw.push(candidate);
                break;
            }
        }
    }

    raw
}

/// Register encoding of one aligned range, for seeding a mock register
/// file directly.
pub fn pair_for_range(range: &MemoryRange, physical_address_bits: u32) -> VariablePair {
    let valid_bits_mask = (1u64 << physical_address_bits) - 1;
    let valid_address_mask = valid_bits_mask & !0xFFF;
    VariablePair {
        base: (range.base_address & valid_address_mask) | range.cache_type as u64,
        mask: (!(range.length - 1) & valid_address_mask) | MASK_VALID,
    }
}

/// Decode a snapshot's variable pairs independently of the engine and
/// canonicalize, for comparing programmed hardware state against the
/// expected partition.
pub fn collect_variable_result(
    default_type: CacheType,
    physical_address_bits: u32,
    variable_count: u32,
    snapshot: &RegisterSnapshot,
) -> (Vec<MemoryRange>, u32) {
    let valid_bits_mask = (1u64 << physical_address_bits) - 1;
    let valid_address_mask = valid_bits_mask & !0xFFF;

    let mut raw: Vec<MemoryRange> = Vec::new();
    for pair in snapshot.variable.pairs.iter().take(variable_count as usize) {
        if pair.mask & MASK_VALID == 0 {
            continue;
        }
        raw.push(MemoryRange {
            base_address: pair.base & valid_address_mask,
            length: (!(pair.mask & valid_address_mask) & valid_bits_mask) + 1,
            cache_type: CacheType::from((pair.base & 0xFF) as u8),
        });
    }

    let used = raw.len() as u32;
    (ranges::effective_ranges(default_type, physical_address_bits, &raw), used)
}

pub fn dump_ranges(label: &str, ranges: &[MemoryRange]) {
    println!("--- {} [{}] ---", label, ranges.len());
    for range in ranges {
        println!(
            "\t{{ {:#018x}, {:#018x}, {:?} }},",
            range.base_address, range.length, range.cache_type
        );
    }
}

pub fn verify_ranges(expected: &[MemoryRange], actual: &[MemoryRange]) {
    assert_eq!(expected.len(), actual.len(), "partition lengths differ");
    for (expected, actual) in expected.iter().zip(actual.iter()) {
        assert_eq!(expected.base_address, actual.base_address);
        assert_eq!(expected.length, actual.length);
        assert_eq!(expected.cache_type, actual.cache_type);
    }
}
