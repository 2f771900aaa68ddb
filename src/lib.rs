use std::collections::HashMap;

use crate::config::{node_name_map, ScenarioConfig};
use crate::engine::ids::{EntityId, EntityName};
use crate::engine::Engine;
use crate::error::Result;
use crate::failure::{read_trace, FailureInjector, TraceConfig};
use crate::gis::Gis;
use crate::grid_resource::GridResource;
use crate::resource::{Machine, MachineId, ResourceCalendar, ResourceCharacteristics};
use crate::shutdown::ShutdownCoordinator;
use crate::stats::StatisticsSink;

pub mod config;
pub mod engine;
pub mod error;
pub mod failure;
pub mod gis;
pub mod grid_resource;
pub mod job;
pub mod logger;
pub mod policy;
pub mod resource;
pub mod shutdown;
pub mod stats;

/// A fully constructed, not-yet-run simulation: the [`Engine`] with every resource,
/// the GIS, the statistics sink, and the shutdown coordinator registered, plus an index
/// from each resource's configured name to the [`EntityId`] the engine assigned it.
///
/// Building a scenario never runs it: the caller (a test, the demo binary, a future
/// broker entity) is expected to schedule its own workload events against
/// `resource_ids`/`gis_id` and eventually signal `shutdown_id` before calling
/// `engine.run()`.
pub struct ScenarioHandle {
    pub engine: Engine,
    pub gis_id: EntityId,
    pub stats_sink_id: EntityId,
    pub shutdown_id: EntityId,
    pub resource_ids: HashMap<String, EntityId>,
}

fn build_characteristics(cfg: &crate::config::ResourceConfig) -> ResourceCharacteristics {
    let mut pe_start = 0u32;
    let machines = cfg
        .machines
        .iter()
        .enumerate()
        .map(|(idx, m)| {
            let machine = Machine::new(MachineId(idx as u32), m.pe_count, m.mips_rating, pe_start);
            pe_start += m.pe_count;
            machine
        })
        .collect();
    ResourceCharacteristics { machines, allocation_model: cfg.allocation_model, cost_per_sec: cfg.cost_per_sec, resource_time_zone: cfg.resource_time_zone }
}

fn build_calendar(cfg: &crate::config::CalendarConfig) -> ResourceCalendar {
    ResourceCalendar::new(cfg.weekday_load, cfg.holiday_load, cfg.holidays.iter().copied().collect(), cfg.weekend_days.iter().copied().collect(), cfg.time_zone, cfg.rng_seed)
}

/// Builds every entity described by `config` and registers it with a fresh [`Engine`],
/// wiring GIS registration, statistics, and failure injection, but does not run it.
pub fn build_scenario(config: &ScenarioConfig) -> Result<ScenarioHandle> {
    let mut engine = Engine::new();

    let gis_id = engine.register(Box::new(Gis::new(EntityName::new("gis"))));

    let mut stats_sink = StatisticsSink::new(EntityName::new("stats"));
    if let Some(path) = &config.stats_log_path {
        stats_sink = stats_sink.with_log_file(path)?;
    }
    stats_sink = stats_sink.exclude_from_file(config.stats_exclude_from_file.clone()).exclude_from_memory(config.stats_exclude_from_memory.clone());
    let stats_sink_id = engine.register(Box::new(stats_sink));

    let shutdown_id = engine.register(Box::new(ShutdownCoordinator::new(EntityName::new("shutdown"), gis_id, config.shutdown_signal_count, config.quiesce_delay_s).with_stats_sink(stats_sink_id)));

    let mut resource_ids = HashMap::new();
    for resource_cfg in &config.resources {
        let characteristics = build_characteristics(resource_cfg);
        let calendar = build_calendar(&resource_cfg.calendar);
        let node_map: HashMap<String, MachineId> = node_name_map(&resource_cfg.machines).into_iter().map(|(name, idx)| (name, MachineId(idx))).collect();

        let resource = GridResource::new(EntityName::new(resource_cfg.name.clone()), characteristics, calendar, node_map)
            .with_gis(gis_id)
            .with_stats_sink(stats_sink_id)
            .with_opportunistic_reservations(resource_cfg.allow_opportunistic_reservations);
        let resource_id = engine.register(Box::new(resource));
        resource_ids.insert(resource_cfg.name.clone(), resource_id);

        if let Some(trace_cfg) = &resource_cfg.failure_trace {
            let trace_config: TraceConfig = trace_cfg.into();
            let events = read_trace(&trace_cfg.path, &trace_config)?;
            engine.register(Box::new(FailureInjector::new(EntityName::new(format!("{}-failure-injector", resource_cfg.name)), resource_id, events)));
        }
    }

    Ok(ScenarioHandle { engine, gis_id, stats_sink_id, shutdown_id, resource_ids })
}
