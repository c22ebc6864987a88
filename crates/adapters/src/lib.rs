// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: the message broker and the upstream DHIS2 APIs

pub mod broker;
pub mod dhis;

pub use broker::{
    headers, AmqpBroker, Broker, BrokerError, ChannelRole, Delivery, MessageHeaders,
    PeekedMessage, QueueOptions, QueueStats,
};
pub use dhis::{
    AnalyticsQuery, CategoryOptionCombo, DhisApi, Endpoint, HttpDhisApi, ImportStrategy,
    UpstreamError,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use broker::MemoryBroker;
#[cfg(any(test, feature = "test-support"))]
pub use dhis::{DhisCall, FakeDhisApi};
