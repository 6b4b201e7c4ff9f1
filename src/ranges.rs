//! Range algebra over typed physical address ranges.
//!
//! Converts a sparse, possibly overlapping set of typed ranges into the
//! canonical partition of the whole physical address space: sorted,
//! gapless, pairwise non-overlapping, adjacent ranges of equal type
//! coalesced. The register codec uses this both to decode the current
//! register file and to fold a new request into it.

use alloc::vec::Vec;

use crate::structs::{CacheType, MemoryRange};

/// How two overlap bit-flags relate.
#[derive(Debug, PartialEq, Eq)]
enum FlagRelation {
    Equal,
    FirstWithinSecond,
    SecondWithinFirst,
    Disjoint,
}

fn flags_relation(flag1: u64, flag2: u64) -> FlagRelation {
    if flag1 == flag2 {
        FlagRelation::Equal
    } else if (flag1 | flag2) == flag2 {
        FlagRelation::FirstWithinSecond
    } else if (flag1 | flag2) == flag1 {
        FlagRelation::SecondWithinFirst
    } else {
        FlagRelation::Disjoint
    }
}

/// Bit k set iff raw range k contains `address` (inclusive test).
fn overlap_bit_flag(raw: &[MemoryRange], address: u64) -> u64 {
    let mut flag = 0u64;
    for (index, range) in raw.iter().enumerate() {
        if range.contains(address) {
            flag |= 1u64 << index;
        }
    }
    flag
}

fn ranges_overlap(left: &MemoryRange, right: &MemoryRange) -> bool {
    (left.base_address <= right.base_address && right.base_address < left.base_address + left.length)
        || (right.base_address <= left.base_address && left.base_address < right.base_address + right.length)
}

/// Every distinct range endpoint (base and last byte), ascending.
fn collect_endpoints(raw: &[MemoryRange]) -> Vec<u64> {
    let mut endpoints = Vec::with_capacity(raw.len() * 2);
    for range in raw {
        endpoints.push(range.base_address);
        endpoints.push(range.base_address + range.length - 1);
    }
    endpoints.sort_unstable();
    endpoints.dedup();
    endpoints
}

fn endpoint_covered(endpoint: u64, pieces: &[MemoryRange]) -> bool {
    pieces.iter().any(|piece| piece.contains(endpoint))
}

/// Highest-precedence type among the raw ranges overlapping `piece`, or
/// `default_type` when nothing overlaps it.
fn piece_type(default_type: CacheType, piece: &MemoryRange, raw: &[MemoryRange]) -> CacheType {
    let mut cache_type = CacheType::Invalid;
    for range in raw {
        if ranges_overlap(piece, range) && (range.cache_type as u8) < (cache_type as u8) {
            cache_type = range.cache_type;
        }
    }
    if cache_type == CacheType::Invalid {
        cache_type = default_type;
    }
    cache_type
}

/// Merge equal-type neighbors and pad the partition out to
/// `[0, 2^address_bits)` with the default type.
fn coalesce_and_extend(
    default_type: CacheType,
    address_bits: u32,
    pieces: &[MemoryRange],
) -> Vec<MemoryRange> {
    let max_address = (1u64 << address_bits) - 1;
    let mut merged: Vec<MemoryRange> = Vec::with_capacity(pieces.len() + 2);

    if pieces[0].base_address > 0 {
        merged.push(MemoryRange::new(0, pieces[0].base_address, default_type));
    }

    for piece in pieces {
        match merged.last_mut() {
            Some(last) if last.cache_type == piece.cache_type => {
                debug_assert_eq!(last.base_address + last.length, piece.base_address);
                last.length += piece.length;
            }
            _ => merged.push(*piece),
        }
    }

    let last = merged.last_mut().unwrap();
    if last.base_address + last.length - 1 < max_address {
        if last.cache_type == default_type {
            last.length = max_address - last.base_address + 1;
        } else {
            let tail_base = last.base_address + last.length;
            merged.push(MemoryRange::new(tail_base, max_address - tail_base + 1, default_type));
        }
    }

    merged
}

/// Compute the canonical partition of `[0, 2^address_bits)` implied by a
/// set of raw, possibly overlapping typed ranges.
///
/// Endpoint sweep: the active set of raw ranges can only change at a range
/// endpoint, so each pair of adjacent endpoints is classified by the subset
/// relation of its overlap bit-flags and cut into atomic pieces. A piece's
/// type is the highest-precedence type among the raw ranges covering it.
pub fn effective_ranges(
    default_type: CacheType,
    address_bits: u32,
    raw: &[MemoryRange],
) -> Vec<MemoryRange> {
    assert!(address_bits < 64);
    assert!(raw.len() <= 64);

    if raw.is_empty() {
        return alloc::vec![MemoryRange::new(0, 1u64 << address_bits, default_type)];
    }

    let endpoints = collect_endpoints(raw);
    let mut pieces: Vec<MemoryRange> = Vec::with_capacity(raw.len() * 3 + 1);

    for pair in endpoints.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        let flag1 = overlap_bit_flag(raw, left);
        let flag2 = overlap_bit_flag(raw, right);

        match flags_relation(flag1, flag2) {
            FlagRelation::Equal => {
                // One active set across the whole closed interval.
                pieces.push(MemoryRange::new(left, right - left + 1, CacheType::Invalid));
            }
            FlagRelation::FirstWithinSecond => {
                // Extra ranges switch on exactly at the right endpoint.
                pieces.push(MemoryRange::new(left, right - left, CacheType::Invalid));
            }
            FlagRelation::SecondWithinFirst => {
                // Some ranges end exactly at the left endpoint.
                pieces.push(MemoryRange::new(left + 1, right - left, CacheType::Invalid));
                if !endpoint_covered(left, &pieces) {
                    pieces.push(MemoryRange::new(left, 1, CacheType::Invalid));
                }
            }
            FlagRelation::Disjoint => {
                // Ranges end at the left endpoint while others begin at the
                // right one. Touching ranges leave an empty interior; the
                // endpoints themselves still need cover.
                let interior = right - left - 1;
                if interior != 0 {
                    pieces.push(MemoryRange::new(left + 1, interior, CacheType::Invalid));
                }
                if !endpoint_covered(left, &pieces) {
                    pieces.push(MemoryRange::new(left, 1, CacheType::Invalid));
                }
            }
        }
    }

    // A final endpoint that only terminates ranges is covered by no pair
    // iteration; give it its own piece.
    let last_endpoint = *endpoints.last().unwrap();
    if !endpoint_covered(last_endpoint, &pieces) {
        pieces.push(MemoryRange::new(last_endpoint, 1, CacheType::Invalid));
    }

    for piece in pieces.iter_mut() {
        piece.cache_type = piece_type(default_type, piece, raw);
    }

    pieces.sort_unstable_by_key(|piece| piece.base_address);
    coalesce_and_extend(default_type, address_bits, &pieces)
}

/// Overwrite `[base_address, base_address + length)` with `cache_type` in a
/// canonical partition, splitting boundary ranges and re-coalescing.
///
/// The span must already be covered by the partition. Returns whether the
/// partition changed.
pub fn set_range_type(
    partition: &mut Vec<MemoryRange>,
    base_address: u64,
    length: u64,
    cache_type: CacheType,
) -> bool {
    assert!(length != 0);
    let limit = base_address + length;

    let start = partition
        .iter()
        .position(|r| r.base_address <= base_address && base_address < r.base_address + r.length)
        .expect("range base not covered by partition");
    let end = partition
        .iter()
        .position(|r| r.base_address < limit && limit <= r.base_address + r.length)
        .expect("range limit not covered by partition");

    if start == end && partition[start].cache_type == cache_type {
        return false;
    }

    let left_length = base_address - partition[start].base_address;
    let right_length = partition[end].base_address + partition[end].length - limit;

    let mut replacement: Vec<MemoryRange> = Vec::with_capacity(3);
    if left_length != 0 {
        replacement.push(MemoryRange::new(
            partition[start].base_address,
            left_length,
            partition[start].cache_type,
        ));
    }
    replacement.push(MemoryRange::new(base_address, length, cache_type));
    if right_length != 0 {
        replacement.push(MemoryRange::new(limit, right_length, partition[end].cache_type));
    }
    partition.splice(start..=end, replacement);

    // Re-coalesce around the splice.
    let mut index = 0;
    while index + 1 < partition.len() {
        if partition[index].cache_type == partition[index + 1].cache_type {
            partition[index].length += partition[index + 1].length;
            partition.remove(index + 1);
        } else {
            index += 1;
        }
    }

    true
}
