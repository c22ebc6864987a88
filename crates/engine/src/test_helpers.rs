// SPDX-License-Identifier: MIT

//! Shared fixtures for engine tests.

use crate::engine::{Engine, EngineDefaults, EngineDeps};
use porter_adapters::{FakeDhisApi, MemoryBroker};
use porter_config::{
    Configuration, DataItemConfig, InstanceConfig, Mapping, MemoryConfigStore,
};
use porter_core::{ConfigId, FakeClock, PeriodType};
use porter_storage::ScratchStore;
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) const SOURCE_URL: &str = "https://source.example.org";
pub(crate) const DEST_URL: &str = "https://dest.example.org";

pub(crate) struct TestEngine {
    pub engine: Arc<Engine<FakeClock>>,
    pub broker: MemoryBroker,
    pub dhis: FakeDhisApi,
    pub configs: MemoryConfigStore,
    pub clock: FakeClock,
    // Kept alive so scratch files persist for the test's duration.
    #[allow(dead_code)]
    pub scratch_dir: TempDir,
}

pub(crate) fn test_engine() -> TestEngine {
    let broker = MemoryBroker::new();
    let dhis = FakeDhisApi::new();
    let configs = MemoryConfigStore::new();
    let clock = FakeClock::new();
    let scratch_dir = match TempDir::new() {
        Ok(dir) => dir,
        Err(e) => panic!("tempdir: {e}"),
    };
    let engine = Arc::new(Engine::new(
        EngineDeps {
            broker: Arc::new(broker.clone()),
            dhis: Arc::new(dhis.clone()),
            configs: Arc::new(configs.clone()),
            scratch: ScratchStore::new(scratch_dir.path()),
        },
        clock.clone(),
        EngineDefaults::default(),
    ));
    TestEngine {
        engine,
        broker,
        dhis,
        configs,
        clock,
        scratch_dir,
    }
}

pub(crate) fn instance(base_url: &str) -> InstanceConfig {
    InstanceConfig {
        base_url: base_url.to_string(),
        username: "admin".to_string(),
        password: "district".to_string(),
        route_id: None,
    }
}

pub(crate) fn monthly_item(id: &str, mappings: Vec<Mapping>) -> DataItemConfig {
    DataItemConfig {
        id: id.to_string(),
        period_type: PeriodType::Monthly,
        parent_org_unit: "OU_ROOT".to_string(),
        org_unit_level: Some("3".to_string()),
        mappings,
        attribute_combo: None,
    }
}

pub(crate) fn config_with_items(id: &str, data_items: Vec<DataItemConfig>) -> Configuration {
    Configuration {
        id: ConfigId::new(id),
        source: instance(SOURCE_URL),
        destination: instance(DEST_URL),
        data_items,
    }
}

pub(crate) fn mapping(source_id: &str, destination_id: &str) -> Mapping {
    Mapping {
        source_id: source_id.to_string(),
        destination_id: destination_id.to_string(),
    }
}
