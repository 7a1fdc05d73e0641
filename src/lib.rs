// Licensed under the Apache-2.0 license

// Enforce coding guidelines - prevent panic-prone patterns in production code only
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::indexing_slicing))]
#![cfg_attr(not(test), warn(clippy::expect_used))]
#![cfg_attr(not(test), no_std)]

#[cfg(all(feature = "std", not(test)))]
extern crate std;

// Links the single-core critical-section implementation on bare-metal ARM.
#[cfg(all(target_arch = "arm", target_os = "none"))]
use cortex_m as _;

pub mod common;
pub mod i2c;
