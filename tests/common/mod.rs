// Shared between the integration test binaries; each binary uses a subset.
#![allow(dead_code)]

pub mod page_arena;
pub mod support;
pub mod test_hal;
