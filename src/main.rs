use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ct_rotate::{
    CtSeries, DicomSlice, Interpolation, LoaderOptions, Orientation, RotationEngine,
    RotationState, SliceWriter, VolumeLoader, WindowLevel, finalize_with, render_slice,
};
use env_logger::Env;
use log::info;

#[derive(Parser, Debug)]
#[command(name = "ct-rotate", version, about = "Rotate CT slice stacks in 3D")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the geometry of a slice stack
    Info {
        input: PathBuf,
        #[command(flatten)]
        loader: LoaderArgs,
    },
    /// Render one plane of the (optionally rotated) volume to a PNG file
    Preview {
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = Plane::Axial)]
        orientation: Plane,
        /// Plane index, defaults to the middle of the volume
        #[arg(long)]
        index: Option<usize>,
        #[command(flatten)]
        angles: AngleArgs,
        #[arg(long, default_value_t = 2000.0)]
        window_width: f64,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        window_level: f64,
        #[arg(long, default_value = "preview.png")]
        out: PathBuf,
        #[command(flatten)]
        loader: LoaderArgs,
    },
    /// Rotate the whole volume and write it as a new slice stack
    Rotate {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        angles: AngleArgs,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        loader: LoaderArgs,
    },
    /// Rotate every slice in-plane on its own (legacy 2D mode)
    RotateSlices {
        input: PathBuf,
        /// Clockwise angle in degrees
        #[arg(long, allow_negative_numbers = true)]
        angle: f64,
        /// Output directory, defaults to the input directory
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        loader: LoaderArgs,
    },
}

#[derive(Args, Debug)]
struct LoaderArgs {
    /// File name prefix of the slices to load
    #[arg(long, default_value = "CT")]
    prefix: String,
    /// File extension of the slices to load
    #[arg(long, default_value = "dcm")]
    extension: String,
}

impl From<&LoaderArgs> for LoaderOptions {
    fn from(args: &LoaderArgs) -> Self {
        LoaderOptions {
            file_prefix: args.prefix.clone(),
            extension: args.extension.clone(),
        }
    }
}

/// Clockwise angles in degrees, as dragged in each view.
#[derive(Args, Debug)]
struct AngleArgs {
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    axial: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    sagittal: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    coronal: f64,
}

impl From<&AngleArgs> for RotationState {
    fn from(args: &AngleArgs) -> Self {
        RotationState::new(args.axial, args.sagittal, args.coronal)
    }
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Value for samples rotated in from outside the volume
    #[arg(long, default_value_t = RotationEngine::AIR_HU, allow_negative_numbers = true)]
    fill_value: i16,
    /// Use nearest-neighbour instead of trilinear sampling
    #[arg(long)]
    nearest: bool,
}

impl From<&EngineArgs> for RotationEngine {
    fn from(args: &EngineArgs) -> Self {
        let interpolation = if args.nearest {
            Interpolation::Nearest
        } else {
            Interpolation::Linear
        };
        RotationEngine::new()
            .with_fill_value(args.fill_value)
            .with_interpolation(interpolation)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Plane {
    Axial,
    Sagittal,
    Coronal,
}

impl From<Plane> for Orientation {
    fn from(plane: Plane) -> Self {
        match plane {
            Plane::Axial => Orientation::Axial,
            Plane::Sagittal => Orientation::Sagittal,
            Plane::Coronal => Orientation::Coronal,
        }
    }
}

fn load(input: &Path, loader: &LoaderArgs) -> Result<CtSeries<DicomSlice>> {
    VolumeLoader::load_from_directory(input, &LoaderOptions::from(loader))
        .with_context(|| format!("loading CT files from {}", input.display()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Info { input, loader } => {
            let series = load(&input, &loader)?;
            let volume = series.volume();
            let spacing = volume.spacing();
            println!("slices:   {}", volume.slice_count());
            println!("size:     {} x {}", volume.columns(), volume.rows());
            println!(
                "spacing:  {:.3} x {:.3} x {:.3} mm",
                spacing.x, spacing.y, spacing.z
            );
            if let (Some(first), Some(last)) = (series.positions().first(), series.positions().last())
            {
                println!("z range:  {first:.2} .. {last:.2} mm");
            }
        }
        Command::Preview {
            input,
            orientation,
            index,
            angles,
            window_width,
            window_level,
            out,
            loader,
        } => {
            let series = load(&input, &loader)?;
            let rotation = RotationState::from(&angles);
            let rotated;
            let volume = if rotation.is_identity() {
                series.volume()
            } else {
                rotated = RotationEngine::new().rotate_volume(series.volume(), &rotation);
                &rotated
            };

            let orientation = Orientation::from(orientation);
            let count = volume.plane_count(orientation);
            let index = index.unwrap_or(count.saturating_sub(1) / 2);
            let Some(slice) = volume.get_slice_from_axis(index, orientation) else {
                bail!("{orientation:?} index {index} is out of range (0..{count})");
            };
            let image = render_slice(&slice, &WindowLevel::new(window_width, window_level))
                .context("rendering preview")?;
            image
                .save(&out)
                .with_context(|| format!("saving {}", out.display()))?;
            info!("Wrote {orientation:?} plane {index} to {}", out.display());
        }
        Command::Rotate {
            input,
            output,
            angles,
            engine,
            loader,
        } => {
            let series = load(&input, &loader)?;
            let engine = RotationEngine::from(&engine);
            finalize_with(&engine, &series, &RotationState::from(&angles), &output)
                .context("writing rotated slices")?;
        }
        Command::RotateSlices {
            input,
            angle,
            output,
            engine,
            loader,
        } => {
            let series = load(&input, &loader)?;
            let rotated = RotationEngine::from(&engine).rotate_slices(series.volume(), angle);
            let output = output.unwrap_or(input);
            SliceWriter::write_series(&series, &rotated, &output)
                .context("writing rotated slices")?;
        }
    }

    Ok(())
}
