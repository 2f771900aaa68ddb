use std::path::PathBuf;

use clap::Parser;

use gridsim_kernel::config::ScenarioConfig;
use gridsim_kernel::engine::event::{Payload, Tag};
use gridsim_kernel::{build_scenario, logger};

/// Runs a resource allocation scenario from a JSON configuration file and prints the
/// statistics sink's recorded categories once the simulation winds down.
#[derive(Parser, Debug)]
#[command(name = "gridsim-demo")]
struct Args {
    /// Path to a scenario configuration JSON file.
    scenario: PathBuf,

    /// Simulated seconds to run before signalling shutdown, if the scenario itself
    /// never submits a terminating workload.
    #[arg(long, default_value_t = 3600.0)]
    duration_s: f64,
}

fn main() -> anyhow::Result<()> {
    logger::init();

    let args = Args::parse();
    let config = ScenarioConfig::from_json_file(&args.scenario)?;

    let mut handle = build_scenario(&config)?;
    log::info!("scenario built with {} resource(s)", handle.resource_ids.len());

    let driver_id = handle.gis_id;
    handle.engine.schedule(driver_id, handle.shutdown_id, args.duration_s, Tag::EndOfSimulation, Payload::None, None);

    handle.engine.run();
    log::info!("simulation complete");
    Ok(())
}
