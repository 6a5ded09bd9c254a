use nbody_grid::initial_condition::{InitialCondition, Sphere};
use nbody_grid::statistics::GridStatistics;
use nbody_grid::{
    deposit_adaptive_plane, deposit_uniform_grid_3d, linspace, Axis, DepositParameters,
    PlaneGeometry, Position, Projection, Scalar,
};

use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::path::{Path, PathBuf};
use structopt::StructOpt;
use tracing::{info, Level};

#[derive(StructOpt, Debug)]
#[structopt(name = "nbody_grid")]
struct Opt {
    /// Particle dump, `.json` or `.msgpack`. A synthetic sphere is deposited when omitted.
    #[structopt(short, long)]
    input_file: Option<PathBuf>,
    /// JSON file with the deposition settings
    #[structopt(short, long)]
    settings: Option<PathBuf>,
    #[structopt(short, long)]
    output_dir: Option<PathBuf>,
    /// Number of particles in the synthetic sphere
    #[structopt(long, default_value = "100000")]
    num_particles: usize,
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
struct BinningOpt {
    /// Number of bins along each axis
    #[structopt(long, default_value = "64")]
    bins: usize,
    #[structopt(long, default_value = "0")]
    min: Scalar,
    #[structopt(long, default_value = "1")]
    max: Scalar,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Count particles on a regular 3d grid
    Grid3d {
        #[structopt(flatten)]
        binning: BinningOpt,
    },
    /// Project particles on an adaptively smoothed lensing plane
    Adaptive {
        #[structopt(flatten)]
        binning: BinningOpt,
        /// Axis projected out (0, 1 or 2)
        #[structopt(long, default_value = "2")]
        normal: usize,
        /// Position of the plane along the normal
        #[structopt(long, default_value = "0.5")]
        center: Scalar,
        /// Project every particle, not just the ones whose smoothing sphere cuts the plane
        #[structopt(long)]
        project_all: bool,
        /// Smoothing radius for particles that don't carry one
        #[structopt(long, default_value = "0.01")]
        radius: Scalar,
    },
}

/// The particle file format read by this tool.
#[derive(Serialize, Deserialize, Debug)]
struct ParticleDump {
    positions: Vec<[f32; 3]>,
    #[serde(default)]
    smoothing_radii: Option<Vec<Scalar>>,
}

fn main() -> eyre::Result<()> {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let params = match &opt.settings {
        Some(path) => std::fs::read(path)
            .wrap_err_with(|| format!("Failed to read JSON settings file: {:?}", path))
            .and_then(|json| {
                serde_json::from_slice(&json).wrap_err("Serde failed to deserialize JSON.")
            })?,
        None => DepositParameters::default(),
    };
    info!(?params, "Deposition settings");

    let dump = match &opt.input_file {
        Some(path) => read_particles(path)?,
        None => synthetic_particles(&opt),
    };
    let positions: Vec<Position> = dump.positions.iter().map(|&p| p.into()).collect();
    info!(num_particles = positions.len(), "Loaded particles");

    match &opt.command {
        Command::Grid3d { binning } => {
            let edges = bin_edges(binning);
            let grid = deposit_uniform_grid_3d(&positions, [&edges, &edges, &edges], &params)?;

            info!(
                total = grid.total(),
                max = grid.max_value(),
                occupied = grid.occupied_cells(),
                "Deposited grid"
            );
            write_output(opt.output_dir.as_deref(), "grid3d.dat", &grid)?;
        }
        Command::Adaptive {
            binning,
            normal,
            center,
            project_all,
            radius,
        } => {
            let edges = bin_edges(binning);
            let radii = match dump.smoothing_radii {
                Some(radii) => radii,
                None => vec![*radius; positions.len()],
            };

            let normal = Axis::try_from(*normal)?;
            let geometry = PlaneGeometry {
                projection: Projection::along(normal),
                center: *center,
                project_all: *project_all,
            };

            let plane =
                deposit_adaptive_plane(&positions, &radii, [&edges, &edges], geometry, &params)?;

            info!(
                total = plane.total(),
                max = plane.max_value(),
                occupied = plane.occupied_cells(),
                "Deposited lensing plane"
            );
            write_output(opt.output_dir.as_deref(), "plane.dat", &plane)?;
        }
    }

    Ok(())
}

fn bin_edges(binning: &BinningOpt) -> Vec<Scalar> {
    linspace(binning.min, binning.max, binning.bins + 1).collect()
}

fn synthetic_particles(opt: &Opt) -> ParticleDump {
    let (min, max) = match &opt.command {
        Command::Grid3d { binning } | Command::Adaptive { binning, .. } => {
            (binning.min, binning.max)
        }
    };

    let sphere = Sphere {
        num_particles: opt.num_particles,
        center: nalgebra::Vector3::from_element(0.5 * (min + max)),
        radius: 0.4 * (max - min),
    };
    info!(?sphere, "No input file, depositing a synthetic sphere");

    ParticleDump {
        positions: sphere.particles().iter().map(|p| [p.x, p.y, p.z]).collect(),
        smoothing_radii: None,
    }
}

fn read_particles(path: &Path) -> eyre::Result<ParticleDump> {
    let bytes = std::fs::read(path)
        .wrap_err_with(|| format!("Failed to read particle file: {:?}", path))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            serde_json::from_slice(&bytes).wrap_err("Serde failed to deserialize JSON.")
        }
        Some("msgpack") => rmp_serde::from_read_ref(&bytes)
            .wrap_err("Failed to deserialize MessagePack particle file."),
        _ => Err(eyre::eyre!(
            "Unknown particle file extension: {:?}, expected .json or .msgpack",
            path
        )),
    }
}

fn write_output<T: Serialize>(dir: Option<&Path>, name: &str, value: &T) -> eyre::Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => {
            info!("No output directory, skipping write");
            return Ok(());
        }
    };

    let path = dir.join(name);
    let mut writer = std::fs::File::create(&path)
        .wrap_err_with(|| format!("Failed to create output file: {:?}", path))?;
    rmp_serde::encode::write(&mut writer, value)?;

    info!(?path, "Wrote output");
    Ok(())
}
