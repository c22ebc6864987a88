// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! porter-daemon: the HTTP service exposing the migration pipeline to
//! operators

pub mod api;
pub mod env;

pub use api::{build_router, AppState};
