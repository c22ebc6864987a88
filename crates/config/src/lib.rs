// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! porter-config: migration configurations and the store that holds them

pub mod model;
pub mod store;

pub use model::{
    AttributeComboSelector, Configuration, DataItemConfig, InstanceConfig, Mapping, MappingSide,
    RuntimeConfig, ValidationParams,
};
pub use store::{ConfigError, ConfigStore, FileConfigStore};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod memory;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryConfigStore;
