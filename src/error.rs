pub type MemAttrResult<T> = Result<T, MemAttrError>;

/// Failures surfaced by the range-register engine and the page-table
/// splitter. Internal invariant violations are asserts, not variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAttrError {
    /// Malformed caller input: zero length, misaligned base or length,
    /// backwards split request, non-canonical target partition.
    InvalidParameter,

    /// The hardware cannot express the request: range registers absent,
    /// address outside the physical address width, sub-1MB request not
    /// aligned to the fixed-range granularity, or no mapping to split.
    Unsupported,

    /// The canonical partition needs more variable range registers than
    /// the usable budget provides.
    RegistersExhausted,

    /// The page allocator could not produce a page-table page.
    OutOfResources,
}
