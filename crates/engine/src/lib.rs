// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! porter-engine: planner, queue manager, worker runtime, mapping and
//! validation engines

mod engine;
pub mod error;
mod failed;
mod handlers;
mod mapping;
mod planner;
mod queues;
mod sessions;
mod status;
#[cfg(test)]
mod test_helpers;
mod validation;
mod worker;

pub use engine::{Engine, EngineDefaults, EngineDeps};
pub use error::{EngineError, HandlerError};
pub use failed::{FailedMessage, FailedQueueListing, DEFAULT_REPLAY_LIMIT};
pub use mapping::{apply_attribute_fanout, ComboRef, ResolvedMapping};
pub use planner::{DataPlanRequest, PlanSummary};
pub use queues::{FamilyQueueStats, FamilyStats, QueueFamilyDeleted};
pub use sessions::{
    ValidationProgress, ValidationSession, ValidationSessionStore, ValidationStatus,
};
pub use status::{ConfigStatus, FamilyHealth, QueueStatusEntry, RunState};
pub use validation::{diff_values, ValueKey};
pub use worker::{QueueCounters, WorkerMetrics, IMMEDIATE_REQUEUE_LIMIT, WORKER_RECONNECT_DELAY};
