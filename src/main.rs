//! In-situ pipeline - dry-run entry point
//!
//! Runs the full update protocol against the in-memory backend, with one
//! thread per simulated partition.
//!
//! ```bash
//! insitu-rs [CONFIG] [STEPS] [PARTITIONS]
//! ```

use anyhow::Context;
use insitu_rs::{
    backend::{MockBackend, MockDataset, ScriptedLink},
    config::PipelineConfig,
    pipeline::{Communicator, LiveLinkController, PipelineOrchestrator, ThreadCommunicator},
    types::DataDescription,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_STEPS: u64 = 10;
const DEFAULT_PARTITIONS: usize = 2;
const TIME_STEP: f64 = 0.1;

fn init_logging(config: &PipelineConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let (file_layer, guard) = match &config.output.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "insitu-rs.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,insitu_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// One simulated partition: its slab of the unit box along x.
fn partition_dataset(rank: usize, partitions: usize, step: u64) -> MockDataset {
    let width = 1.0 / partitions as f64;
    let x0 = rank as f64 * width;
    let phase = step as f64 * TIME_STEP;
    MockDataset::default()
        .with_bounds([x0, x0 + width, 0.0, 1.0, 0.0, 1.0])
        .with_contour_range(phase.sin() - rank as f64, phase.cos() + rank as f64)
        .with_print_metadata(step % 5 == 0)
        .with_prefix("insitu_")
}

fn run_partition(
    comm: ThreadCommunicator,
    config: PipelineConfig,
    steps: u64,
) -> anyhow::Result<()> {
    let rank = comm.rank();
    let partitions = comm.size();
    let backend = MockBackend::new();
    let link = if config.link.enabled {
        LiveLinkController::new(Box::new(ScriptedLink::new(backend.log())))
    } else {
        LiveLinkController::headless()
    };
    let mut orchestrator = PipelineOrchestrator::new(backend, link, Box::new(comm), config);

    let mut first = DataDescription::new(0.0, 0, Arc::new(partition_dataset(rank, partitions, 0)));
    if !orchestrator.request_data_description(Some(&mut first)) {
        anyhow::bail!("rank {}: data description rejected", rank);
    }
    orchestrator
        .initialize(&first)
        .with_context(|| format!("rank {}: pipeline initialization failed", rank))?;
    orchestrator.set_clip_planes([0.0, 0.2, 0.0], [0.0, 1.0, 0.0], 0.3)?;
    orchestrator.set_slice_planes([0.5, 0.5, 0.5], [0.0, 0.0, 1.0], 3, 0.2)?;

    for step in 1..=steps {
        let dataset = Arc::new(partition_dataset(rank, partitions, step));
        let desc = DataDescription::new(step as f64 * TIME_STEP, step, dataset);
        let report = orchestrator.co_process(&desc)?;
        if !report.update.is_clean() || !report.failed_views.is_empty() {
            tracing::warn!("rank {}: step {} finished with errors", rank, step);
        }
    }

    tracing::info!(
        "rank {}: {} steps, {} collective calls",
        rank,
        steps,
        orchestrator.reducer().calls()
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut config = match args.first() {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("loading {}", path))?,
        None => PipelineConfig::default(),
    };
    if config.output.file_name.is_empty() {
        config.output.file_name = "insitu.vtu".to_string();
    }
    let steps: u64 = match args.get(1) {
        Some(s) => s.parse().context("STEPS must be a number")?,
        None => DEFAULT_STEPS,
    };
    let partitions: usize = match args.get(2) {
        Some(s) => s.parse().context("PARTITIONS must be a number")?,
        None => DEFAULT_PARTITIONS,
    };

    let _guard = init_logging(&config);
    tracing::info!(
        "Starting dry run: {} steps on {} partitions",
        steps,
        partitions
    );

    let handles: Vec<_> = ThreadCommunicator::group(partitions)
        .into_iter()
        .map(|comm| {
            let config = config.clone();
            std::thread::spawn(move || run_partition(comm, config, steps))
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("partition thread panicked"))??;
    }

    tracing::info!("Dry run complete");
    Ok(())
}
