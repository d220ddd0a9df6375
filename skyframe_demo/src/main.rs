use clap::{Parser, Subcommand};
use log::{debug, info};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use skyframe::astro::{self, ICRS, SAGITTARIUS};
use skyframe::{
    read_configuration, Coordinate, Differential, Epoch, FrameDescriptor, NamedComponents,
    Representation, TransformGraph,
};
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use uom::si::angle::{degree, radian};
use uom::si::f64::Angle;

/// km/s of tangential velocity per kpc of distance for a proper motion of 1 mas/yr.
const KMS_PER_KPC_PER_MAS_YR: f64 = 4.740470463533348;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Extra frames and transforms to register (RON)
    #[clap(long, global = true, value_parser)]
    config: Option<PathBuf>,
    /// Log graph activity
    #[clap(long, short, global = true)]
    verbose: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a position, and optionally a velocity, between two frames
    Convert {
        /// Longitude in degrees (ra, l, Lambda, ...)
        #[clap(long, allow_hyphen_values = true)]
        lon: f64,
        /// Latitude in degrees (dec, b, Beta, ...)
        #[clap(long, allow_hyphen_values = true)]
        lat: f64,
        /// Distance in kpc
        #[clap(long, default_value_t = 1.0)]
        distance: f64,
        /// Proper motion in longitude times cos(latitude), mas/yr
        #[clap(long, allow_hyphen_values = true)]
        pm_lon_coslat: Option<f64>,
        /// Proper motion in latitude, mas/yr
        #[clap(long, allow_hyphen_values = true)]
        pm_lat: Option<f64>,
        /// Radial velocity, km/s
        #[clap(long, allow_hyphen_values = true)]
        radial_velocity: Option<f64>,
        /// Frame the input is expressed in
        #[clap(long, default_value = ICRS)]
        from: String,
        /// Frame to convert to
        #[clap(long, default_value = SAGITTARIUS)]
        to: String,
        /// Epoch of the observation as a Julian year
        #[clap(long)]
        epoch: Option<f64>,
    },
    /// List registered frames and transforms
    List,
    /// Print the transform graph in the dot format
    Dot,
}

fn to_radians(degrees: f64) -> f64 {
    Angle::new::<degree>(degrees).get::<radian>()
}

fn to_degrees(radians: f64) -> f64 {
    Angle::new::<radian>(radians).get::<degree>()
}

/// Display units are degrees, kpc, mas/yr and km/s. The graph works in radians
/// and kpc, with proper motions in km/s per kpc so that every velocity is in km/s.
fn position_from_display(descriptor: &FrameDescriptor, values: [f64; 3]) -> [f64; 3] {
    match descriptor.representation() {
        Representation::Spherical => [to_radians(values[0]), to_radians(values[1]), values[2]],
        Representation::Cartesian => values,
    }
}

fn velocity_from_display(descriptor: &FrameDescriptor, values: [f64; 3]) -> [f64; 3] {
    match descriptor.differential() {
        Some(Differential::SphericalCosLat) => [
            values[0] * KMS_PER_KPC_PER_MAS_YR,
            values[1] * KMS_PER_KPC_PER_MAS_YR,
            values[2],
        ],
        _ => values,
    }
}

fn format_position(descriptor: &FrameDescriptor, named: &NamedComponents) -> String {
    let [a, b, c] = &named.names;
    let [x, y, z] = named.values;
    match descriptor.representation() {
        Representation::Spherical => format!(
            "{a} = {:.9} deg, {b} = {:.9} deg, {c} = {z:.6} kpc",
            to_degrees(x),
            to_degrees(y)
        ),
        Representation::Cartesian => format!("{a} = {x:.6}, {b} = {y:.6}, {c} = {z:.6} kpc"),
    }
}

fn format_velocity(descriptor: &FrameDescriptor, named: &NamedComponents) -> String {
    let [a, b, c] = &named.names;
    let [x, y, z] = named.values;
    match descriptor.differential() {
        Some(Differential::SphericalCosLat) => format!(
            "{a} = {:.6} mas/yr, {b} = {:.6} mas/yr, {c} = {z:.3} km/s",
            x / KMS_PER_KPC_PER_MAS_YR,
            y / KMS_PER_KPC_PER_MAS_YR
        ),
        _ => format!("{a} = {x:.3}, {b} = {y:.3}, {c} = {z:.3} km/s"),
    }
}

fn frame_descriptor(graph: &TransformGraph, frame: &str) -> Result<FrameDescriptor, Box<dyn Error>> {
    graph
        .frame(frame)
        .ok_or_else(|| format!("Frame '{frame}' is not registered, see `skyframe-demo list`").into())
}

#[allow(clippy::too_many_arguments)]
fn convert(
    graph: &TransformGraph,
    lon: f64,
    lat: f64,
    distance: f64,
    velocity: Option<[f64; 3]>,
    from: &str,
    to: &str,
    epoch: Option<f64>,
) -> Result<(), Box<dyn Error>> {
    let source = frame_descriptor(graph, from)?;
    let target = frame_descriptor(graph, to)?;

    let position = position_from_display(&source, [lon, lat, distance]);
    let velocity = velocity.map(|v| velocity_from_display(&source, v));
    let velocities = velocity.map(|v| vec![v]);
    let mut coordinate =
        graph.coordinate_from_components(from, &[position], velocities.as_deref())?;
    if let Some(year) = epoch {
        coordinate = coordinate.with_epoch(Epoch::from_julian_year(year));
    }

    let path = graph.find_path(from, to)?;
    debug!("{} transforms between {from} and {to}", path.len());
    let route: Vec<String> = std::iter::once(from.to_string())
        .chain(path.iter().map(|t| t.target().to_string()))
        .collect();
    info!("Route: {}", route.join(" -> "));

    let converted: Coordinate = graph.transform_to(&coordinate, to)?;
    for (position, _) in graph.represent(&converted)? {
        println!("{to}: {}", format_position(&target, &position));
    }
    // Velocities were asked for, so a route that lost them is an error.
    if velocity.is_some() {
        for velocity in graph.represent_velocities(&converted)? {
            println!("{to}: {}", format_velocity(&target, &velocity));
        }
    }
    Ok(())
}

fn list(graph: &TransformGraph) {
    println!("Frames:");
    for id in graph.frames() {
        match graph.frame(&id) {
            Some(descriptor) => {
                let velocity = descriptor
                    .velocity_names()
                    .map(|names| format!(" / {}", names.join(", ")))
                    .unwrap_or_default();
                println!(
                    "  {id} [{:?}] {}{velocity}",
                    descriptor.representation(),
                    descriptor.position_names().join(", ")
                );
            }
            None => println!("  {id}"),
        }
    }
    println!("Transforms:");
    for transform in graph.transforms() {
        println!(
            "  {} -> {} ({}, cost {})",
            transform.source(),
            transform.target(),
            transform.kind().name(),
            transform.cost()
        );
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)?;

    let graph = TransformGraph::global();
    astro::register_builtin(graph)?;
    if let Some(path) = &args.config {
        info!("Loading {}", path.display());
        read_configuration(path)?.apply(graph)?;
    }

    match args.command {
        Command::Convert {
            lon,
            lat,
            distance,
            pm_lon_coslat,
            pm_lat,
            radial_velocity,
            from,
            to,
            epoch,
        } => {
            let velocity = match (pm_lon_coslat, pm_lat, radial_velocity) {
                (Some(pm_lon_coslat), Some(pm_lat), Some(radial_velocity)) => {
                    Some([pm_lon_coslat, pm_lat, radial_velocity])
                }
                (None, None, None) => None,
                _ => {
                    return Err("--pm-lon-coslat, --pm-lat and --radial-velocity go together".into())
                }
            };
            convert(graph, lon, lat, distance, velocity, &from, &to, epoch)?;
        }
        Command::List => list(graph),
        Command::Dot => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            graph.render(&mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}
