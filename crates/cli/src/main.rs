//! Zonalis CLI - Regional statistics over raster layers

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use zonalis_algorithms::aggregate::{
    aggregate, AggregateParams, ProcessingMode, ReductionStatus, StatKind, DEFAULT_MAX_PIXELS,
};
use zonalis_algorithms::index::{
    apply_mask, composite_index, derive_index, evi, mask_and, mask_not, mask_or, mdvi, ndmi, ndvi,
    ndwi, reclassify, regional_growth, threshold_mask, ClassRange, Cmp, CompositeInput, EviParams,
    GrowthLayers, Normalization, NodataPolicy, ReclassifyParams,
};
use zonalis_algorithms::lookup::HierarchyIndex;
use zonalis_algorithms::report::{NullPolicy, RegionTable, TableOptions};
use zonalis_core::io::{read_geotiff, read_regions_geojson, write_geotiff};
use zonalis_core::{AdminLevel, Layer, Raster, RegionSchema, RegionSet};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "zonalis")]
#[command(author, version, about = "Regional statistics over raster layers", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Reduce raster bands over regions and export a table
    Aggregate {
        /// Region polygons (GeoJSON)
        #[arg(short, long)]
        regions: PathBuf,
        /// Admin level of the region source: nation, region, department, commune
        #[arg(short, long, default_value = "region")]
        level: String,
        /// Property holding the region name; repeat for fallback candidates
        #[arg(short, long)]
        name_field: Vec<String>,
        /// Raster band as NAME=FILE; repeat for a multi-band layer
        #[arg(short, long, required = true)]
        band: Vec<String>,
        /// Comma-separated statistics: sum, mean, stdDev, min, max, count, median, p<rank>
        #[arg(short, long, default_value = "mean")]
        stats: String,
        /// Sampling step in map units (defaults to the layer cell size)
        #[arg(long)]
        scale: Option<f64>,
        /// Per-region pixel budget
        #[arg(long, default_value_t = DEFAULT_MAX_PIXELS)]
        max_pixels: u64,
        /// Coarsen the sampling step instead of refusing oversized regions
        #[arg(long)]
        best_effort: bool,
        /// Worker threads (default: one per core)
        #[arg(short, long)]
        threads: Option<usize>,
        /// Process regions one at a time
        #[arg(long)]
        sequential: bool,
        /// Text rendered for null cells
        #[arg(long, default_value = "N/A")]
        null_text: String,
        /// Render null cells as zero instead of text
        #[arg(long)]
        zero_fill: bool,
        /// Decimal places in the exported table
        #[arg(long, default_value = "2")]
        precision: usize,
        /// Output CSV (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Derived-index rasters and growth rates
    Index {
        #[command(subcommand)]
        operation: IndexCommands,
    },
    /// Binary mask construction and application
    Mask {
        #[command(subcommand)]
        operation: MaskCommands,
    },
    /// Find which regions contain a point
    Lookup {
        /// Admin level source as FILE:NAME_FIELD, outermost first; repeat per level
        #[arg(short, long, required = true)]
        level: Vec<String>,
        /// Query point as X,Y in the sources' coordinate system
        #[arg(short, long)]
        point: String,
        /// Wide CSV of per-region values to attach (first column names the region)
        #[arg(short, long)]
        attach: Option<PathBuf>,
    },
}

// ─── Index subcommands ──────────────────────────────────────────────────

#[derive(Subcommand)]
enum IndexCommands {
    /// NDVI: Normalized Difference Vegetation Index
    Ndvi {
        /// NIR band file
        #[arg(long)]
        nir: PathBuf,
        /// Red band file
        #[arg(long)]
        red: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// NDWI: Normalized Difference Water Index
    Ndwi {
        /// Green band file
        #[arg(long)]
        green: PathBuf,
        /// NIR band file
        #[arg(long)]
        nir: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// NDMI: Normalized Difference Moisture Index
    Ndmi {
        /// NIR band file
        #[arg(long)]
        nir: PathBuf,
        /// SWIR band file
        #[arg(long)]
        swir: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// MDVI: Modified Difference Vegetation Index
    Mdvi {
        /// NIR band file
        #[arg(long)]
        nir: PathBuf,
        /// Red band file
        #[arg(long)]
        red: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// EVI: Enhanced Vegetation Index
    Evi {
        /// NIR band file
        #[arg(long)]
        nir: PathBuf,
        /// Red band file
        #[arg(long)]
        red: PathBuf,
        /// Blue band file
        #[arg(long)]
        blue: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Evaluate an arithmetic formula over named bands
    Formula {
        /// Expression over band names, e.g. "(NIR - Red) / (NIR + Red + 0.0001)"
        #[arg(short, long)]
        formula: String,
        /// Input band as NAME=FILE; repeat per band
        #[arg(short, long, required = true)]
        band: Vec<String>,
        /// Output file
        output: PathBuf,
    },
    /// Weighted composite of min-max normalized inputs
    Composite {
        /// Input raster as FILE:WEIGHT; weights must sum to 1
        #[arg(short, long, required = true)]
        input: Vec<String>,
        /// Output file
        output: PathBuf,
    },
    /// Classify index values into ranges
    Reclass {
        /// Input raster
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Class as MIN:MAX:VALUE; repeat per class (the last class takes its upper bound)
        #[arg(short, long, required = true)]
        class: Vec<String>,
        /// Value for cells no class claims (nodata when omitted)
        #[arg(short, long)]
        default: Option<f64>,
    },
    /// SDG 11.3.1 land consumption vs population growth rates per region
    Lcrpgr {
        /// Built-up raster at the first epoch
        #[arg(long)]
        built_t1: PathBuf,
        /// Built-up raster at the second epoch
        #[arg(long)]
        built_t2: PathBuf,
        /// Population raster at the first epoch
        #[arg(long)]
        pop_t1: PathBuf,
        /// Population raster at the second epoch
        #[arg(long)]
        pop_t2: PathBuf,
        /// Years between the two epochs
        #[arg(short, long)]
        years: f64,
        /// Region polygons (GeoJSON)
        #[arg(short, long)]
        regions: PathBuf,
        /// Admin level of the region source: nation, region, department, commune
        #[arg(short, long, default_value = "region")]
        level: String,
        /// Property holding the region name; repeat for fallback candidates
        #[arg(short, long)]
        name_field: Vec<String>,
        /// Per-region pixel budget
        #[arg(long, default_value_t = DEFAULT_MAX_PIXELS)]
        max_pixels: u64,
        /// Coarsen the sampling step instead of refusing oversized regions
        #[arg(long)]
        best_effort: bool,
        /// Output CSV (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ─── Mask subcommands ───────────────────────────────────────────────────

#[derive(Subcommand)]
enum MaskCommands {
    /// Compare a raster against a value
    Threshold {
        /// Input raster
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Comparison: gt, ge, lt, le, eq, ne
        #[arg(short, long)]
        cmp: String,
        /// Threshold value
        #[arg(long)]
        value: f64,
        /// Treat nodata cells as clear instead of propagating them
        #[arg(long)]
        zero_nodata: bool,
    },
    /// Combine two masks cellwise
    Combine {
        /// First mask
        a: PathBuf,
        /// Second mask
        b: PathBuf,
        /// Output file
        output: PathBuf,
        /// Operation: and, or
        #[arg(long)]
        op: String,
    },
    /// Flip set and clear cells
    Invert {
        /// Input mask
        input: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Null out raster cells where a mask is clear
    Apply {
        /// Input raster
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Mask raster
        #[arg(short, long)]
        mask: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &PathBuf) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path)
        .with_context(|| format!("Failed to read raster: {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_result(raster: &Raster<f64>, path: &PathBuf) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &PathBuf, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn load_regions(path: &PathBuf, level: AdminLevel, name_fields: &[String]) -> Result<RegionSet> {
    let schema = if name_fields.is_empty() {
        // GADM, OSM and French-style sources, in that order.
        RegionSchema::with_candidates(
            level,
            vec![
                format!("NAME_{}", level.depth()),
                "name".to_string(),
                "NAME".to_string(),
                "nom".to_string(),
            ],
        )
    } else {
        RegionSchema::with_candidates(level, name_fields.to_vec())
    };
    let pb = spinner("Reading regions...");
    let regions = read_regions_geojson(path, &schema)
        .with_context(|| format!("Failed to read regions: {}", path.display()))?;
    pb.finish_and_clear();
    info!("Regions: {} at level {}", regions.len(), regions.level());
    Ok(regions)
}

fn load_layer(specs: &[String]) -> Result<Layer> {
    let mut bands = Vec::with_capacity(specs.len());
    for spec in specs {
        let (name, path) = parse_band_spec(spec)?;
        bands.push((name, read_raster(&path)?));
    }
    Layer::from_bands(bands).context("Input bands do not share one grid")
}

fn parse_band_spec(s: &str) -> Result<(String, PathBuf)> {
    match s.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => bail!("Band must be 'NAME=FILE', got: {}", s),
    }
}

fn parse_stats(s: &str) -> Result<Vec<StatKind>> {
    let mut stats = Vec::new();
    for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let stat: StatKind = token
            .parse()
            .with_context(|| format!("Invalid statistic: {}", token))?;
        stats.push(stat);
    }
    if stats.is_empty() {
        bail!("No statistics requested");
    }
    Ok(stats)
}

fn parse_admin_level(s: &str) -> Result<AdminLevel> {
    match s.to_lowercase().as_str() {
        "nation" | "country" | "0" => Ok(AdminLevel::Nation),
        "region" | "1" => Ok(AdminLevel::Region),
        "department" | "district" | "2" => Ok(AdminLevel::Department),
        "commune" | "municipality" | "3" => Ok(AdminLevel::Commune),
        _ => bail!(
            "Unknown admin level: {}. Use nation, region, department, or commune.",
            s
        ),
    }
}

fn parse_point(s: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        bail!("Point must be 'X,Y', got: {}", s);
    }
    let x: f64 = parts[0].trim().parse().context("Invalid X coordinate")?;
    let y: f64 = parts[1].trim().parse().context("Invalid Y coordinate")?;
    Ok((x, y))
}

fn parse_cmp(s: &str) -> Result<Cmp> {
    match s.to_lowercase().as_str() {
        "gt" | ">" => Ok(Cmp::Gt),
        "ge" | ">=" => Ok(Cmp::Ge),
        "lt" | "<" => Ok(Cmp::Lt),
        "le" | "<=" => Ok(Cmp::Le),
        "eq" | "==" | "=" => Ok(Cmp::Eq),
        "ne" | "!=" => Ok(Cmp::Ne),
        _ => bail!("Unknown comparison: {}. Use gt, ge, lt, le, eq, ne.", s),
    }
}

fn parse_weighted(s: &str) -> Result<(PathBuf, f64)> {
    match s.rsplit_once(':') {
        Some((path, weight)) if !path.trim().is_empty() => {
            let weight: f64 = weight
                .trim()
                .parse()
                .with_context(|| format!("Invalid weight in: {}", s))?;
            Ok((PathBuf::from(path.trim()), weight))
        }
        _ => bail!("Composite input must be 'FILE:WEIGHT', got: {}", s),
    }
}

fn parse_class(s: &str) -> Result<ClassRange> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        bail!("Class must be 'MIN:MAX:VALUE', got: {}", s);
    }
    let min: f64 = parts[0].trim().parse().context("Invalid class minimum")?;
    let max: f64 = parts[1].trim().parse().context("Invalid class maximum")?;
    let value: f64 = parts[2].trim().parse().context("Invalid class value")?;
    Ok(ClassRange::new(min, max, value))
}

fn parse_level_source(s: &str) -> Result<(PathBuf, String)> {
    match s.rsplit_once(':') {
        Some((path, field)) if !path.trim().is_empty() && !field.trim().is_empty() => {
            Ok((PathBuf::from(path.trim()), field.trim().to_string()))
        }
        _ => bail!("Level source must be 'FILE:NAME_FIELD', got: {}", s),
    }
}

fn table_options(null_text: &str, zero_fill: bool, precision: usize) -> TableOptions {
    let null_policy = if zero_fill {
        NullPolicy::ZeroFill
    } else {
        NullPolicy::Propagate {
            text: null_text.to_string(),
        }
    };
    TableOptions {
        null_policy,
        precision,
        delimiter: b',',
    }
}

fn emit_table(
    table: &RegionTable,
    options: &TableOptions,
    output: Option<&PathBuf>,
    name: &str,
    elapsed: std::time::Duration,
) -> Result<()> {
    match output {
        Some(path) => {
            table
                .write_csv_path(path, options)
                .context("Failed to write table")?;
            done(name, path, elapsed);
        }
        None => {
            let csv = table
                .to_csv_string(options)
                .context("Failed to render table")?;
            print!("{}", csv);
        }
    }
    Ok(())
}

/// Attach per-region values from a wide CSV: the first column names the
/// region, every other column becomes a derived attribute. Empty and "N/A"
/// cells stay null.
fn attach_csv(sets: &mut [RegionSet], path: &PathBuf) -> Result<()> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to read attribute table: {}", path.display()))?;
    let headers = reader
        .headers()
        .context("Attribute table has no header")?
        .clone();
    if headers.len() < 2 {
        bail!("Attribute table needs a region column plus at least one value column");
    }

    let mut attached = 0usize;
    for result in reader.records() {
        let record = result.context("Malformed attribute row")?;
        let region_name = match record.get(0) {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => continue,
        };
        let region = match sets.iter_mut().find_map(|set| set.get_mut(&region_name)) {
            Some(region) => region,
            None => {
                warn!("Attribute row for unknown region: {}", region_name);
                continue;
            }
        };
        for (key, cell) in headers.iter().skip(1).zip(record.iter().skip(1)) {
            let value = match cell.trim() {
                "" | "N/A" => None,
                text => match text.parse::<f64>() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        warn!("Skipping non-numeric {} for {}: {}", key, region_name, text);
                        continue;
                    }
                },
            };
            region.set_derived(key.to_string(), value);
        }
        attached += 1;
    }
    info!("Attached attributes for {} regions", attached);
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len() as f64
            );
        }

        // ── Aggregate ────────────────────────────────────────────────
        Commands::Aggregate {
            regions,
            level,
            name_field,
            band,
            stats,
            scale,
            max_pixels,
            best_effort,
            threads,
            sequential,
            null_text,
            zero_fill,
            precision,
            output,
        } => {
            let statistics = parse_stats(&stats)?;
            let level = parse_admin_level(&level)?;
            let set = load_regions(&regions, level, &name_field)?;
            let layer = load_layer(&band)?;

            let mode = if sequential {
                ProcessingMode::Sequential
            } else {
                match threads {
                    Some(n) => ProcessingMode::ParallelWith(n),
                    None => ProcessingMode::Parallel,
                }
            };
            let params = AggregateParams {
                statistics: statistics.clone(),
                scale,
                max_pixels,
                best_effort,
                mode,
                cancel: None,
            };

            let start = Instant::now();
            let pb = spinner("Aggregating regions...");
            let reductions = aggregate(&set, &layer, &params).context("Aggregation failed")?;
            pb.finish_and_clear();
            let elapsed = start.elapsed();

            let (mut exact, mut approximate, mut outside, mut blocked) = (0, 0, 0, 0);
            for reduction in &reductions {
                match reduction.status() {
                    ReductionStatus::Exact => exact += 1,
                    ReductionStatus::Approximate { .. } => approximate += 1,
                    ReductionStatus::NoIntersection => outside += 1,
                    ReductionStatus::BudgetExceeded { .. } => blocked += 1,
                }
            }
            info!(
                "Reduced {} regions: {} exact, {} approximate, {} outside layer, {} over budget",
                reductions.len(),
                exact,
                approximate,
                outside,
                blocked
            );

            let mut columns = Vec::new();
            for name in layer.band_names() {
                for stat in &statistics {
                    columns.push(format!("{}_{}", name, stat.key()));
                }
            }
            let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();
            let table = RegionTable::from_reductions(&reductions, &column_refs);
            let options = table_options(&null_text, zero_fill, precision);
            emit_table(&table, &options, output.as_ref(), "Region table", elapsed)?;
        }

        // ── Index ────────────────────────────────────────────────────
        Commands::Index { operation } => match operation {
            IndexCommands::Ndvi { nir, red, output } => {
                let nir = read_raster(&nir)?;
                let red = read_raster(&red)?;
                let start = Instant::now();
                let result = ndvi(&nir, &red).context("Failed to calculate NDVI")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("NDVI", &output, elapsed);
            }

            IndexCommands::Ndwi { green, nir, output } => {
                let green = read_raster(&green)?;
                let nir = read_raster(&nir)?;
                let start = Instant::now();
                let result = ndwi(&green, &nir).context("Failed to calculate NDWI")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("NDWI", &output, elapsed);
            }

            IndexCommands::Ndmi { nir, swir, output } => {
                let nir = read_raster(&nir)?;
                let swir = read_raster(&swir)?;
                let start = Instant::now();
                let result = ndmi(&nir, &swir).context("Failed to calculate NDMI")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("NDMI", &output, elapsed);
            }

            IndexCommands::Mdvi { nir, red, output } => {
                let nir = read_raster(&nir)?;
                let red = read_raster(&red)?;
                let start = Instant::now();
                let result = mdvi(&nir, &red).context("Failed to calculate MDVI")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("MDVI", &output, elapsed);
            }

            IndexCommands::Evi {
                nir,
                red,
                blue,
                output,
            } => {
                let nir = read_raster(&nir)?;
                let red = read_raster(&red)?;
                let blue = read_raster(&blue)?;
                let start = Instant::now();
                let result = evi(&nir, &red, &blue, EviParams::default())
                    .context("Failed to calculate EVI")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("EVI", &output, elapsed);
            }

            IndexCommands::Formula {
                formula,
                band,
                output,
            } => {
                let mut named = Vec::with_capacity(band.len());
                for spec in &band {
                    let (name, path) = parse_band_spec(spec)?;
                    named.push((name, read_raster(&path)?));
                }
                let inputs: HashMap<&str, &Raster<f64>> = named
                    .iter()
                    .map(|(name, raster)| (name.as_str(), raster))
                    .collect();
                let start = Instant::now();
                let result =
                    derive_index(&formula, &inputs).context("Failed to evaluate formula")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Derived index", &output, elapsed);
            }

            IndexCommands::Composite { input, output } => {
                let mut weighted = Vec::with_capacity(input.len());
                for spec in &input {
                    let (path, weight) = parse_weighted(spec)?;
                    weighted.push((read_raster(&path)?, weight));
                }
                let inputs: Vec<CompositeInput> = weighted
                    .iter()
                    .map(|(raster, weight)| CompositeInput {
                        raster,
                        weight: *weight,
                        normalization: Normalization::MinMax,
                    })
                    .collect();
                let start = Instant::now();
                let result = composite_index(&inputs).context("Failed to build composite")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Composite index", &output, elapsed);
            }

            IndexCommands::Reclass {
                input,
                output,
                class,
                default,
            } => {
                let mut classes = Vec::with_capacity(class.len());
                for spec in &class {
                    classes.push(parse_class(spec)?);
                }
                let params = ReclassifyParams {
                    classes,
                    default_value: default.unwrap_or(f64::NAN),
                };
                let raster = read_raster(&input)?;
                let start = Instant::now();
                let result = reclassify(&raster, &params).context("Failed to reclassify")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Reclassified index", &output, elapsed);
            }

            IndexCommands::Lcrpgr {
                built_t1,
                built_t2,
                pop_t1,
                pop_t2,
                years,
                regions,
                level,
                name_field,
                max_pixels,
                best_effort,
                output,
            } => {
                let level = parse_admin_level(&level)?;
                let mut set = load_regions(&regions, level, &name_field)?;
                let built_t1 = Layer::single("built", read_raster(&built_t1)?);
                let built_t2 = Layer::single("built", read_raster(&built_t2)?);
                let pop_t1 = Layer::single("pop", read_raster(&pop_t1)?);
                let pop_t2 = Layer::single("pop", read_raster(&pop_t2)?);
                let params = AggregateParams {
                    max_pixels,
                    best_effort,
                    ..Default::default()
                };

                let start = Instant::now();
                let pb = spinner("Computing growth rates...");
                let layers = GrowthLayers {
                    built_t1: &built_t1,
                    built_t2: &built_t2,
                    pop_t1: &pop_t1,
                    pop_t2: &pop_t2,
                };
                let growth = regional_growth(&set, layers, years, &params)
                    .context("Failed to compute growth rates")?;
                pb.finish_and_clear();
                let elapsed = start.elapsed();

                for entry in &growth {
                    if let Some(region) = set.get_mut(&entry.region) {
                        region.set_derived("lcr", entry.rates.lcr);
                        region.set_derived("pgr", entry.rates.pgr);
                        region.set_derived("lcrpgr", entry.rates.lcrpgr);
                        region.set_derived("built_pct", entry.rates.built_pct);
                    }
                }
                let table =
                    RegionTable::from_regions(&set, &["lcr", "pgr", "lcrpgr", "built_pct"]);
                let options = table_options("N/A", false, 4);
                emit_table(&table, &options, output.as_ref(), "Growth table", elapsed)?;
            }
        },

        // ── Mask ─────────────────────────────────────────────────────
        Commands::Mask { operation } => match operation {
            MaskCommands::Threshold {
                input,
                output,
                cmp,
                value,
                zero_nodata,
            } => {
                let cmp = parse_cmp(&cmp)?;
                let policy = if zero_nodata {
                    NodataPolicy::TreatAsFalse
                } else {
                    NodataPolicy::Propagate
                };
                let raster = read_raster(&input)?;
                let start = Instant::now();
                let result =
                    threshold_mask(&raster, cmp, value, policy).context("Failed to build mask")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Mask", &output, elapsed);
            }

            MaskCommands::Combine { a, b, output, op } => {
                let raster_a = read_raster(&a)?;
                let raster_b = read_raster(&b)?;
                let start = Instant::now();
                let result = match op.to_lowercase().as_str() {
                    "and" | "&" => mask_and(&raster_a, &raster_b),
                    "or" | "|" => mask_or(&raster_a, &raster_b),
                    _ => bail!("Unknown mask operation: {}. Use and, or.", op),
                }
                .context("Failed to combine masks")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Mask", &output, elapsed);
            }

            MaskCommands::Invert { input, output } => {
                let raster = read_raster(&input)?;
                let start = Instant::now();
                let result = mask_not(&raster).context("Failed to invert mask")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Mask", &output, elapsed);
            }

            MaskCommands::Apply {
                input,
                output,
                mask,
            } => {
                let raster = read_raster(&input)?;
                let mask = read_raster(&mask)?;
                let start = Instant::now();
                let result = apply_mask(&raster, &mask).context("Failed to apply mask")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Masked raster", &output, elapsed);
            }
        },

        // ── Lookup ───────────────────────────────────────────────────
        Commands::Lookup {
            level,
            point,
            attach,
        } => {
            let (x, y) = parse_point(&point)?;

            let mut sets = Vec::with_capacity(level.len());
            let mut loaded = Vec::with_capacity(level.len());
            for (depth, spec) in level.iter().enumerate() {
                let (path, field) = parse_level_source(spec)?;
                let admin = AdminLevel::from_depth(depth as u8).with_context(|| {
                    format!("Too many levels: {} (nation through commune)", level.len())
                })?;
                let schema = RegionSchema::new(admin, field);
                let pb = spinner("Reading regions...");
                let set = read_regions_geojson(&path, &schema)
                    .with_context(|| format!("Failed to read regions: {}", path.display()))?;
                pb.finish_and_clear();
                info!(
                    "Level {}: {} regions from {}",
                    admin,
                    set.len(),
                    path.display()
                );
                loaded.push(admin);
                sets.push(set);
            }

            if let Some(table) = attach {
                attach_csv(&mut sets, &table)?;
            }

            let start = Instant::now();
            let index =
                HierarchyIndex::build(sets).context("Failed to build the hierarchy index")?;
            info!(
                "Indexed {} levels in {:.2?}",
                index.level_count(),
                start.elapsed()
            );

            println!("Point: ({}, {})", x, y);
            for admin in loaded {
                match index.locate_at(admin, x, y) {
                    Some(hit) => {
                        match hit.code {
                            Some(code) => {
                                println!("  {:<12} {} [{}]", admin.label(), hit.region, code)
                            }
                            None => println!("  {:<12} {}", admin.label(), hit.region),
                        }
                        let mut keys: Vec<&String> = hit.derived.keys().collect();
                        keys.sort();
                        for key in keys {
                            match hit.derived[key] {
                                Some(value) => println!("      {} = {:.4}", key, value),
                                None => println!("      {} = N/A", key),
                            }
                        }
                    }
                    None => println!("  {:<12} N/A", admin.label()),
                }
            }
        }
    }

    Ok(())
}
