mod params;
mod report;

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use nalgebra::Isometry3;
use ndt_core::filtering::voxel_downsample;
use ndt_core::pointcloud::transform_points;
use ndt_core::test_utils::make_offset_half_cubic_pcd;
use ndt_core::NdtError;
use tracing::{info, warn};

use params::Args;
use report::{CloudSizes, RegistrationReport, StageTimings};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ndt_align=info,ndt_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let report = run(&args)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn run(args: &Args) -> Result<RegistrationReport> {
    let started = Instant::now();
    let registration = args
        .registration_builder()
        .build()
        .context("invalid registration parameters")?;

    // First scan is the target, the second one is the same scene seen after
    // the configured motion.
    let target_cloud = make_offset_half_cubic_pcd(args.scene_length, args.scene_interval);
    let motion = args.motion.isometry();
    let input_cloud = transform_points(&target_cloud, &motion);
    info!(
        target = target_cloud.len(),
        source = input_cloud.len(),
        "Generated scans"
    );

    let stage = Instant::now();
    let filtered_cloud = voxel_downsample(&input_cloud, args.leaf_size);
    let downsample_ms = StageTimings::millis(stage.elapsed());
    info!(
        leaf_size = args.leaf_size,
        points = filtered_cloud.len(),
        "Downsampled source"
    );

    let stage = Instant::now();
    let target = registration
        .prepare_target(&target_cloud)
        .context("failed to prepare target")?;
    let prepare_target_ms = StageTimings::millis(stage.elapsed());

    let stage = Instant::now();
    let result = match registration.align(&target, &filtered_cloud, &Isometry3::identity()) {
        Ok(result) => result,
        Err(err @ NdtError::OptimizationDiverged { .. }) => {
            if let Some(last) = err.last_transform() {
                warn!(
                    translation = %last.translation.vector.transpose(),
                    "Last finite transform before divergence"
                );
            }
            return Err(err).context("registration diverged");
        }
        Err(err) => return Err(err).context("registration failed"),
    };
    let registration_ms = StageTimings::millis(stage.elapsed());

    let sizes = CloudSizes {
        target_points: target_cloud.len(),
        source_points: input_cloud.len(),
        filtered_points: filtered_cloud.len(),
        grid_cells: target.grid().len(),
    };
    let timings = StageTimings {
        downsample_ms,
        prepare_target_ms,
        registration_ms,
        total_ms: StageTimings::millis(started.elapsed()),
    };

    Ok(RegistrationReport::new(sizes, &result, &motion, timings))
}
