use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::failure::TraceConfig;
use crate::resource::AllocationModel;

/// A single machine's static capacity, as read from a scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    pub pe_count: u32,
    pub mips_rating: i64,
    /// Name this machine answers to in a failure trace, if any.
    pub node_name: Option<String>,
}

/// Background-load calendar as read from a scenario file, mirroring
/// [`crate::resource::ResourceCalendar`] field-for-field so it deserializes directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub weekday_load: [f64; 24],
    pub holiday_load: [f64; 24],
    pub holidays: Vec<u32>,
    pub weekend_days: Vec<u8>,
    pub time_zone: i8,
    pub rng_seed: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        CalendarConfig { weekday_load: [0.0; 24], holiday_load: [0.0; 24], holidays: Vec::new(), weekend_days: vec![0, 6], time_zone: 0, rng_seed: 0 }
    }
}

/// A failure trace to attach to a resource, and the column layout to read it with.
/// Column defaults follow §6's literal layout `(nodeId=3, eventType=6, startTime=7,
/// endTime=8, maxField=9)`, 1-based in the file and 0-based here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureTraceConfig {
    pub path: PathBuf,
    #[serde(default = "default_node_col")]
    pub node_col: usize,
    #[serde(default = "default_event_col")]
    pub event_col: usize,
    #[serde(default = "default_start_time_col")]
    pub start_time_col: usize,
    #[serde(default = "default_end_time_col")]
    pub end_time_col: usize,
    #[serde(default = "default_max_field")]
    pub max_field: usize,
    #[serde(default = "default_unavailable_token")]
    pub unavailable_token: String,
    #[serde(default = "default_available_token")]
    pub available_token: String,
    #[serde(default)]
    pub trace_start_offset_s: f64,
}

fn default_node_col() -> usize {
    2
}
fn default_event_col() -> usize {
    5
}
fn default_start_time_col() -> usize {
    6
}
fn default_end_time_col() -> usize {
    7
}
fn default_max_field() -> usize {
    8
}
fn default_unavailable_token() -> String {
    "unavailable-start".to_string()
}
fn default_available_token() -> String {
    "available-start".to_string()
}

impl From<&FailureTraceConfig> for TraceConfig {
    fn from(cfg: &FailureTraceConfig) -> Self {
        TraceConfig {
            node_col: cfg.node_col,
            event_col: cfg.event_col,
            start_time_col: cfg.start_time_col,
            end_time_col: cfg.end_time_col,
            max_field: cfg.max_field,
            unavailable_token: cfg.unavailable_token.clone(),
            available_token: cfg.available_token.clone(),
            comment_prefix: '#',
            trace_start_offset_s: cfg.trace_start_offset_s,
        }
    }
}

/// One resource in the scenario: its name, capacity, scheduling discipline, calendar,
/// and optional failure trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    pub machines: Vec<MachineConfig>,
    pub allocation_model: AllocationModel,
    pub cost_per_sec: f64,
    pub resource_time_zone: i8,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub failure_trace: Option<FailureTraceConfig>,
    #[serde(default)]
    pub allow_opportunistic_reservations: bool,
}

/// Top-level scenario configuration: every resource to stand up, plus global
/// simulation parameters. Deserialized from JSON via `serde_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub resources: Vec<ResourceConfig>,
    /// Seconds to wait after every resource reports completion before the GIS cascade
    /// fires, giving in-flight reply traffic a chance to land.
    #[serde(default = "default_quiesce_delay")]
    pub quiesce_delay_s: f64,
    /// Number of independent `EndOfSimulation` signals the shutdown coordinator waits
    /// for before cascading shutdown through the GIS. Typically one per workload
    /// broker/user entity the caller drives the scenario with.
    #[serde(default = "default_shutdown_signal_count")]
    pub shutdown_signal_count: u32,
    #[serde(default)]
    pub stats_log_path: Option<PathBuf>,
    #[serde(default)]
    pub stats_exclude_from_file: Vec<String>,
    #[serde(default)]
    pub stats_exclude_from_memory: Vec<String>,
}

fn default_quiesce_delay() -> f64 {
    1.0
}

fn default_shutdown_signal_count() -> u32 {
    1
}

impl ScenarioConfig {
    pub fn from_json_str(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

/// Node-name-to-machine-index mapping, one per resource, built from each
/// [`MachineConfig::node_name`] for the failure injector to translate trace node ids
/// back onto concrete machines.
pub fn node_name_map(machines: &[MachineConfig]) -> HashMap<String, u32> {
    machines.iter().enumerate().filter_map(|(idx, m)| m.node_name.as_ref().map(|name| (name.clone(), idx as u32))).collect()
}
