//! Command-line driver for the calibration pipeline
//!
//! One subcommand per batch stage: collect ENVI captures, subtract dark,
//! compute reflectance, average the center crop, gather the distance series,
//! and fit the correction model.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hypercal::core::{
    compute_reflectance, fit, gather_distance_set, spatial_mean, DarkCorrection, DarkMethod,
    DistanceSeries, EdgeOrder,
};
use hypercal::io::{Dataset, EnviReader, MetadataTable};
use hypercal::types::{Distance, FrameMeta, SpectralCube};
use ndarray::Array1;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "hypercal", version, about)]
struct Cli {
    /// Answer yes to confirmation prompts
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect ENVI captures into a combined dataset
    Collect {
        /// ENVI data files (headers are found as .hdr companions)
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        /// Name of the collected variable
        #[arg(short, long, default_value = "dn")]
        variable: String,
        /// Measurement-log CSV to join on filename
        #[arg(short, long)]
        meta: Option<PathBuf>,
    },
    /// Collect ENVI captures and subtract a dark capture
    SubDark {
        inputs: Vec<PathBuf>,
        /// Dark-capture ENVI file
        #[arg(short, long)]
        dark: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long)]
        meta: Option<PathBuf>,
        /// Average the dark over rows before subtracting
        #[arg(long)]
        row_mean: bool,
    },
    /// Compute reflectance against the white reference frames
    Reflectance {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, default_value = "dark_corrected_dn")]
        variable: String,
    },
    /// Spatially average the center crop of a variable
    SpatialMean {
        input: PathBuf,
        #[arg(short, long)]
        variable: String,
        /// Crop edge length in pixels
        #[arg(short, long)]
        n: usize,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Pull the distance-series frames into their own dataset
    GatherDistance {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Frame indices of the green tiles
        #[arg(long, value_delimiter = ',', default_values_t = vec![12, 17, 21])]
        green_idx: Vec<usize>,
        /// Frame indices of the PTFE panels
        #[arg(long, value_delimiter = ',', default_values_t = vec![19, 18, 20])]
        ptfe_idx: Vec<usize>,
        /// Distance labels, green frames first
        #[arg(
            long,
            value_delimiter = ',',
            default_values_t = vec![
                Distance::Near, Distance::Middle, Distance::Far,
                Distance::Middle, Distance::Near, Distance::Far,
            ],
            value_parser = parse_distance,
        )]
        distances: Vec<Distance>,
    },
    /// Fit the five-parameter correction model
    FitModel {
        /// Dataset holding the measured spectra
        measured: PathBuf,
        #[arg(long, default_value = "mean_reflectance")]
        measured_var: String,
        /// Dataset holding the assigned spectra (defaults to the measured dataset)
        #[arg(long)]
        assigned: Option<PathBuf>,
        #[arg(long, default_value = "assigned_reflectance")]
        assigned_var: String,
        /// Boundary stencil accuracy (1 or 2)
        #[arg(long, default_value_t = 2)]
        edge_order: u8,
        /// Where to write the fitted coefficients as JSON
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn parse_distance(s: &str) -> std::result::Result<Distance, String> {
    s.parse::<Distance>().map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Collect {
            inputs,
            output,
            variable,
            meta,
        } => collect(&inputs, &output, &variable, meta.as_deref(), cli.yes),
        Command::SubDark {
            inputs,
            dark,
            output,
            meta,
            row_mean,
        } => sub_dark(&inputs, &dark, &output, meta.as_deref(), row_mean, cli.yes),
        Command::Reflectance {
            input,
            output,
            variable,
        } => reflectance(&input, &output, &variable),
        Command::SpatialMean {
            input,
            variable,
            n,
            output,
        } => spatial_mean_cmd(&input, &variable, n, &output, cli.yes),
        Command::GatherDistance {
            input,
            output,
            green_idx,
            ptfe_idx,
            distances,
        } => gather_distance(&input, &output, green_idx, ptfe_idx, distances),
        Command::FitModel {
            measured,
            measured_var,
            assigned,
            assigned_var,
            edge_order,
            output,
        } => fit_model(
            &measured,
            &measured_var,
            assigned.as_deref(),
            &assigned_var,
            edge_order,
            &output,
        ),
    }
}

/// Ask `Is this right? [y/n]`, honoring --yes
fn confirm(yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    print!("Is this right? [y/n] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim() == "y")
}

/// Read a sorted list of ENVI captures, joining the measurement log
fn read_captures(
    inputs: &[PathBuf],
    meta: Option<&Path>,
) -> Result<(Vec<SpectralCube>, Array1<f64>, Vec<FrameMeta>)> {
    if inputs.is_empty() {
        bail!("No input files given");
    }
    let mut inputs = inputs.to_vec();
    inputs.sort();

    let table = meta
        .map(|p| {
            let t = MetadataTable::from_file(p)?;
            println!("Including columns {:?} from {}", t.columns, p.display());
            Ok::<_, anyhow::Error>(t)
        })
        .transpose()?;

    let mut cubes = Vec::new();
    let mut frames = Vec::new();
    let mut wavelengths: Option<Vec<f64>> = None;
    for path in &inputs {
        let reader =
            EnviReader::open(path).with_context(|| format!("Opening {}", path.display()))?;
        if wavelengths.is_none() {
            wavelengths = reader.header().wavelengths.clone();
        }
        cubes.push(reader.read_cube()?);

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("frame")
            .to_string();
        let mut frame = FrameMeta::named(&name);
        if let Some(table) = &table {
            let filename = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or(&frame.name)
                .to_string();
            table.apply(&filename, &mut frame);
        }
        frames.push(frame);
    }

    let wavelengths = match wavelengths {
        Some(wl) => Array1::from(wl),
        None => {
            log::warn!("Headers carry no wavelengths; using band indices");
            let bands = cubes[0].dim().0;
            Array1::from_iter((0..bands).map(|b| b as f64))
        }
    };

    Ok((cubes, wavelengths, frames))
}

fn echo_inputs(inputs: &[PathBuf]) {
    println!("{}", "=".repeat(80));
    let mut sorted = inputs.to_vec();
    sorted.sort();
    for i in &sorted {
        println!("{}", i.display());
    }
    println!("{}", "=".repeat(80));
}

fn collect(
    inputs: &[PathBuf],
    output: &Path,
    variable: &str,
    meta: Option<&Path>,
    yes: bool,
) -> Result<()> {
    println!("Collecting the following files to variable {}", variable);
    println!("in {}:", output.display());
    echo_inputs(inputs);
    if !confirm(yes)? {
        println!("Aborting...");
        return Ok(());
    }

    let (cubes, wavelengths, frames) = read_captures(inputs, meta)?;
    let ds = Dataset::from_cubes(variable, cubes, wavelengths, frames)?;

    println!("Finished, saving to {}", output.display());
    ds.save(output)?;
    Ok(())
}

fn sub_dark(
    inputs: &[PathBuf],
    dark: &Path,
    output: &Path,
    meta: Option<&Path>,
    row_mean: bool,
    yes: bool,
) -> Result<()> {
    println!("Subtracting {} from the following files", dark.display());
    println!("and saving output dataset to {}", output.display());
    echo_inputs(inputs);
    if !confirm(yes)? {
        println!("Aborting...");
        return Ok(());
    }

    let dark_cube = EnviReader::open(dark)?.read_cube()?;
    println!("Dark read, reading dataset");
    let (cubes, wavelengths, frames) = read_captures(inputs, meta)?;
    let mut ds = Dataset::from_cubes("dn", cubes, wavelengths, frames)?;

    println!("Data read, subtracting dark");
    let method = if row_mean {
        DarkMethod::RowMean
    } else {
        DarkMethod::PerPixel
    };
    DarkCorrection::with_method(dark_cube, method).apply_to_dataset(
        &mut ds,
        "dn",
        "dark_corrected_dn",
    )?;

    println!("Finished, saving to {}", output.display());
    ds.save(output)?;
    Ok(())
}

fn reflectance(input: &Path, output: &Path, variable: &str) -> Result<()> {
    println!("Calculating reflectances from dataset {}", input.display());
    println!("and saving result to {}.", output.display());
    println!("{}", "=".repeat(80));
    println!("Reading dataset");
    let mut ds = Dataset::load(input)?;

    compute_reflectance(&mut ds, variable, "reflectance")?;
    println!(
        "Calculated reflectances using references {:?}",
        ds.references
    );

    println!("Saving results to {}", output.display());
    ds.save(output)?;
    Ok(())
}

fn spatial_mean_cmd(
    input: &Path,
    variable: &str,
    n: usize,
    output: &Path,
    yes: bool,
) -> Result<()> {
    println!(
        "Calculate spatial mean of {} x {} center pixels of variable {} in {}",
        n,
        n,
        variable,
        input.display()
    );
    println!(
        "and save it as mean_{} in {}?",
        variable,
        output.display()
    );
    if !confirm(yes)? {
        println!("Aborting...");
        return Ok(());
    }

    println!("Opening dataset");
    let mut ds = Dataset::load(input)?;
    println!("Calculating mean and std for variable {}", variable);
    spatial_mean(&mut ds, variable, n)?;
    println!("Saving result to {}", output.display());
    ds.save(output)?;
    Ok(())
}

fn gather_distance(
    input: &Path,
    output: &Path,
    green_idx: Vec<usize>,
    ptfe_idx: Vec<usize>,
    distances: Vec<Distance>,
) -> Result<()> {
    println!(
        "Looking for green tiles and PTFEs from {}",
        input.display()
    );
    let ds = Dataset::load(input)?;
    let series = DistanceSeries {
        green: green_idx,
        ptfe: ptfe_idx,
        distances,
    };
    let subset = gather_distance_set(&ds, &series)?;

    println!("Saving new dataset to {}", output.display());
    subset.save(output)?;
    Ok(())
}

fn fit_model(
    measured: &Path,
    measured_var: &str,
    assigned: Option<&Path>,
    assigned_var: &str,
    edge_order: u8,
    output: &Path,
) -> Result<()> {
    let edge = match edge_order {
        1 => EdgeOrder::One,
        2 => EdgeOrder::Two,
        other => bail!("Edge order must be 1 or 2, got {}", other),
    };

    let measured_ds = Dataset::load(measured)?;
    let assigned_ds = match assigned {
        Some(path) => Some(Dataset::load(path)?),
        None => None,
    };
    let assigned_ds = assigned_ds.as_ref().unwrap_or(&measured_ds);

    fn spectra_2d(ds: &Dataset, var: &str) -> Result<ndarray::Array2<f64>> {
        let table = ds
            .get(var)?
            .spectra()
            .with_context(|| format!("Variable {} cannot feed the fit", var))?;
        Ok(table)
    }
    let measured_arr = spectra_2d(&measured_ds, measured_var)?;
    let assigned_arr = spectra_2d(assigned_ds, assigned_var)?;
    if assigned_ds.wavelengths != measured_ds.wavelengths {
        bail!("Measured and assigned datasets are on different wavelength grids");
    }

    let result = fit(
        measured_arr.view(),
        assigned_arr.view(),
        measured_ds.wavelengths.view(),
        edge,
    )?;

    println!(
        "Fitted coefficients over {} samples (rmse {:.6e}):",
        result.n_samples, result.rmse
    );
    let c = &result.coefficients;
    println!(
        "  c1 = {:.6e}\n  c2 = {:.6e}\n  c3 = {:.6e}\n  c4 = {:.6e}\n  c5 = {:.6e}",
        c.c1, c.c2, c.c3, c.c4, c.c5
    );

    let f = std::fs::File::create(output)
        .with_context(|| format!("Creating {}", output.display()))?;
    serde_json::to_writer_pretty(f, &result)?;
    println!("Saved fit to {}", output.display());
    Ok(())
}
