//! Command-line parameters of the driver.

use clap::Parser;
use nalgebra::Isometry3;
use ndt_core::test_utils::make_transform;
use ndt_core::{NdtRegistration, NdtRegistrationBuilder};

/// Register two synthetic scans of a half-cube scene with NDT and report
/// the fit quality.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Step-size ceiling of the Newton update
    #[arg(long, default_value_t = 0.1)]
    pub step: f64,

    /// Grid cell edge length in meters
    #[arg(long, default_value_t = 1.0)]
    pub resolution: f64,

    /// Maximum optimizer iterations
    #[arg(long, default_value_t = 35)]
    pub iterations: usize,

    /// Translation convergence threshold in meters
    #[arg(long, default_value_t = 0.01)]
    pub trans_epsilon: f64,

    /// Outlier ratio of the score model
    #[arg(long, default_value_t = 0.55)]
    pub outlier_ratio: f64,

    /// Leaf size used to downsample the second scan
    #[arg(long, default_value_t = 0.2)]
    pub leaf_size: f64,

    /// Pairs farther apart than this are ignored by RMS (unbounded if unset)
    #[arg(long)]
    pub max_range: Option<f64>,

    /// Edge length of the synthetic half-cube scene
    #[arg(long, default_value_t = 10.0)]
    pub scene_length: f32,

    /// Point spacing of the synthetic scene
    #[arg(long, default_value_t = 0.1)]
    pub scene_interval: f32,

    #[command(flatten)]
    pub motion: MotionArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Motion between the two synthetic scans.
#[derive(clap::Args, Debug, Clone)]
pub struct MotionArgs {
    #[arg(long, default_value_t = 0.3, allow_hyphen_values = true)]
    pub tx: f64,

    #[arg(long, default_value_t = -0.2, allow_hyphen_values = true)]
    pub ty: f64,

    #[arg(long, default_value_t = 0.15, allow_hyphen_values = true)]
    pub tz: f64,

    /// Rotation about z in degrees
    #[arg(long, default_value_t = 2.0, allow_hyphen_values = true)]
    pub yaw: f64,

    /// Rotation about y in degrees
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub pitch: f64,

    /// Rotation about x in degrees
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub roll: f64,
}

impl MotionArgs {
    pub fn isometry(&self) -> Isometry3<f64> {
        make_transform([self.tx, self.ty, self.tz], self.yaw, self.pitch, self.roll)
    }
}

impl Args {
    /// Registration settings, not yet validated.
    pub fn registration_builder(&self) -> NdtRegistrationBuilder {
        NdtRegistration::builder()
            .resolution(self.resolution)
            .step_size(self.step)
            .max_iterations(self.iterations)
            .transformation_epsilon(self.trans_epsilon)
            .outlier_ratio(self.outlier_ratio)
            .fitness_max_range(self.max_range.unwrap_or(f64::INFINITY))
    }
}
