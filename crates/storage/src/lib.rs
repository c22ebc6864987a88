// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! porter-storage: scratch files for downloaded data-value sets

pub mod scratch;

pub use scratch::{ScratchStore, StorageError};
