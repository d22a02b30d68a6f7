use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use abotyper::aggregate::{CompletionBarrier, RunManifest};
use abotyper::caller::PhenotypeCall;
use abotyper::layout::{self, UnitPaths};
use abotyper::pipeline;
use abotyper::{Panel, Region, ResultAggregator, ThresholdOverrides, TypingConfig};

#[derive(Parser, Debug)]
#[command(
    name = "abotyper",
    version,
    about = "ABO genotyping from exon 6 and exon 7 pileups"
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct ThresholdArgs {
    /// Minimum mean depth over the region.
    #[arg(long)]
    min_mean_depth: Option<f64>,
    /// Minimum breadth of coverage, in percent.
    #[arg(long)]
    min_breadth: Option<f64>,
    /// Minimum evidence depth for a site to be called.
    #[arg(long)]
    min_site_depth: Option<u32>,
    /// Variant fraction at which an allele is present.
    #[arg(long)]
    present_cutoff: Option<f64>,
    /// Variant fraction at which an allele is dominant.
    #[arg(long)]
    dominant_cutoff: Option<f64>,
    /// Polymorphism log noise floor.
    #[arg(long)]
    noise_threshold: Option<f64>,
    /// Relative reported/recomputed depth difference that gets flagged.
    #[arg(long)]
    depth_divergence_tolerance: Option<f64>,
}

impl ThresholdArgs {
    fn overrides(&self) -> ThresholdOverrides {
        ThresholdOverrides {
            min_mean_depth: self.min_mean_depth,
            min_breadth: self.min_breadth,
            min_site_depth: self.min_site_depth,
            present_cutoff: self.present_cutoff,
            dominant_cutoff: self.dominant_cutoff,
            noise_threshold: self.noise_threshold,
            depth_divergence_tolerance: self.depth_divergence_tolerance,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a pileup and write its frequency, site and polymorphism tables.
    Quantify {
        /// Pileup file (plain or gzip).
        pileup: PathBuf,
        /// Panel TOML file.
        panel: PathBuf,
        /// Region the pileup covers (exon6 or exon7).
        region: Region,
        /// Sample id (default: pileup file name up to the first dot).
        #[arg(long)]
        sample: Option<String>,
        /// Output root.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Call a genotype from a site table and a coverage table.
    Call {
        /// Diagnostic-site table written by `quantify`.
        sites: PathBuf,
        /// `samtools coverage` table.
        coverage: PathBuf,
        /// Panel TOML file (default: built-in panel).
        #[arg(long)]
        panel: Option<PathBuf>,
        /// Sample id (default: site table file name up to the first dot).
        #[arg(long)]
        sample: Option<String>,
        /// Region (default: the region recorded in the site table).
        #[arg(long)]
        region: Option<Region>,
        /// Output root.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Run manifest whose run id stamps the call file
        /// (default: `<out_dir>/run_manifest.json` when present).
        #[arg(long)]
        manifest: Option<PathBuf>,
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Aggregate call files under a run directory.
    Aggregate {
        /// Run directory holding `<sample>/<region>/` call files.
        dir: PathBuf,
        /// Wait for every unit listed in this manifest before aggregating
        /// (default: `<dir>/run_manifest.json` when present).
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Panel TOML whose combination table joins the regions
        /// (default: built-in panel).
        #[arg(long)]
        panel: Option<PathBuf>,
        /// Seconds to wait for manifest units.
        #[arg(long, default_value_t = 600)]
        timeout: u64,
        /// Where to write report files (default: the run directory).
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Run every unit under an input directory in parallel, then aggregate.
    Run {
        /// Input directory laid out as `<sample>/<region>/`.
        input_dir: PathBuf,
        /// Output root.
        #[arg(long, default_value = "abotyper_out")]
        out_dir: PathBuf,
        /// Panel TOML file (default: built-in panel).
        #[arg(long)]
        panel: Option<PathBuf>,
        /// Indexed reference FASTA to check panel reference alleles against.
        #[arg(long)]
        reference: Option<PathBuf>,
        /// Worker threads (default: all cores).
        #[arg(long)]
        threads: Option<usize>,
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Write the run manifest for an input directory.
    Manifest {
        /// Input directory laid out as `<sample>/<region>/`.
        input_dir: PathBuf,
        /// Output root the manifest is written into.
        #[arg(long, default_value = "abotyper_out")]
        out_dir: PathBuf,
        /// Panel TOML file (default: built-in panel).
        #[arg(long)]
        panel: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Quantify {
            pileup,
            panel,
            region,
            sample,
            out_dir,
            thresholds,
        } => run_quantify(&pileup, &panel, region, sample, &out_dir, &thresholds)?,
        Commands::Call {
            sites,
            coverage,
            panel,
            sample,
            region,
            out_dir,
            manifest,
            thresholds,
        } => {
            let target = CallTarget {
                sample,
                region,
                out_dir,
                manifest,
            };
            run_call(&sites, &coverage, panel.as_deref(), target, &thresholds)?
        }
        Commands::Aggregate {
            dir,
            manifest,
            panel,
            timeout,
            out_dir,
        } => run_aggregate(
            &dir,
            manifest.as_deref(),
            panel.as_deref(),
            timeout,
            out_dir.as_deref(),
        )?,
        Commands::Run {
            input_dir,
            out_dir,
            panel,
            reference,
            threads,
            thresholds,
        } => run_all(
            &input_dir,
            &out_dir,
            panel.as_deref(),
            reference.as_deref(),
            threads,
            &thresholds,
        )?,
        Commands::Manifest {
            input_dir,
            out_dir,
            panel,
        } => run_manifest(&input_dir, &out_dir, panel.as_deref())?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "abotyper=debug" } else { "abotyper=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_panel(path: Option<&Path>) -> Result<Panel> {
    match path {
        Some(path) => Panel::from_path(path)
            .with_context(|| format!("failed to load panel {}", path.display())),
        None => Panel::builtin().context("built-in panel is invalid"),
    }
}

/// Defaults, then panel thresholds, then flags.
fn resolve_config(panel: &Panel, thresholds: &ThresholdArgs) -> Result<TypingConfig> {
    let config = TypingConfig::default()
        .with_overrides(panel.thresholds())
        .with_overrides(&thresholds.overrides());
    config.validate().context("invalid thresholds")?;
    Ok(config)
}

fn sample_from_file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .with_context(|| {
            format!("cannot derive a sample id from {}; pass --sample", path.display())
        })
}

fn run_quantify(
    pileup: &Path,
    panel_path: &Path,
    region: Region,
    sample: Option<String>,
    out_dir: &Path,
    thresholds: &ThresholdArgs,
) -> Result<()> {
    let panel = load_panel(Some(panel_path))?;
    let config = resolve_config(&panel, thresholds)?;
    let sample_id = match sample {
        Some(sample) => sample,
        None => sample_from_file_name(pileup)?,
    };
    let quantification = pipeline::quantify(pileup, panel.region(region)?, &config)
        .with_context(|| format!("failed to quantify {}", pileup.display()))?;
    let paths = UnitPaths::new(out_dir, &sample_id, region);
    pipeline::write_quantification(&quantification, &paths).context("failed to write tables")?;

    for skipped in &quantification.parsed.skipped {
        println!("skipped\tline {}\t{}", skipped.line_number, skipped.reason);
    }
    println!(
        "{sample_id}\t{region}\trecords={}\tsites={}\tpolymorphisms={}\tdivergences={}",
        quantification.parsed.records.len(),
        quantification.extraction.sites.len(),
        quantification.extraction.polymorphisms.len(),
        quantification.parsed.divergences.len()
    );
    println!("{}", paths.site_table().display());
    Ok(())
}

/// The explicit manifest, or the run directory's own one when present.
fn find_manifest(explicit: Option<&Path>, dir: &Path) -> Result<Option<RunManifest>> {
    let default = dir.join(layout::MANIFEST_FILE);
    let path = match explicit {
        Some(path) => path,
        None if default.is_file() => default.as_path(),
        None => return Ok(None),
    };
    let manifest = RunManifest::read(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    info!(
        path = %path.display(),
        run_id = manifest.run_id.as_deref().unwrap_or_default(),
        "using run manifest"
    );
    Ok(Some(manifest))
}

/// Where a standalone call is written and which run it joins.
struct CallTarget {
    sample: Option<String>,
    region: Option<Region>,
    out_dir: PathBuf,
    manifest: Option<PathBuf>,
}

fn run_call(
    sites: &Path,
    coverage: &Path,
    panel_path: Option<&Path>,
    target: CallTarget,
    thresholds: &ThresholdArgs,
) -> Result<()> {
    let panel = load_panel(panel_path)?;
    let config = resolve_config(&panel, thresholds)?;
    let sample_id = match target.sample {
        Some(sample) => sample,
        None => sample_from_file_name(sites)?,
    };
    let mut call =
        pipeline::call_from_tables(&panel, &config, &sample_id, target.region, sites, coverage)
            .with_context(|| format!("failed to call {}", sites.display()))?;
    let manifest = find_manifest(target.manifest.as_deref(), &target.out_dir)?;
    if let Some(run_id) = manifest.and_then(|manifest| manifest.run_id) {
        call = call.with_run_id(run_id);
    }
    let paths = UnitPaths::new(&target.out_dir, &sample_id, call.region());
    pipeline::write_call_outputs(&call, &[], &paths).context("failed to write call file")?;
    print_call(&call);
    println!("{}", paths.call_file().display());
    Ok(())
}

fn print_call(call: &PhenotypeCall) {
    let flags: Vec<String> = call.flags().iter().map(ToString::to_string).collect();
    println!(
        "{}\t{}\t{}\tgenotype={}\tphenotype={}\tflags={}",
        call.sample_id(),
        call.region(),
        call.status(),
        call.genotype().map_or_else(|| call.candidates().join("|"), str::to_string),
        call.phenotype().unwrap_or("-"),
        flags.join(",")
    );
}

fn run_aggregate(
    dir: &Path,
    manifest_path: Option<&Path>,
    panel_path: Option<&Path>,
    timeout: u64,
    out_dir: Option<&Path>,
) -> Result<()> {
    let panel = load_panel(panel_path)?;
    let mut aggregator = ResultAggregator::new(dir).with_panel(panel);
    if let Some(manifest) = find_manifest(manifest_path, dir)? {
        CompletionBarrier::new(Duration::from_secs(timeout))
            .wait(dir, &manifest)
            .context("run did not complete")?;
        aggregator = aggregator.with_manifest(manifest);
    }
    let out_dir = out_dir.unwrap_or(dir);
    let (report, outputs) = aggregator
        .run(out_dir)
        .with_context(|| format!("failed to aggregate {}", dir.display()))?;
    info!(
        samples = report.results().len(),
        anomalies = report.anomalies().len(),
        "aggregation finished"
    );
    println!("{}", outputs.results_tsv.display());
    Ok(())
}

fn run_all(
    input_dir: &Path,
    out_dir: &Path,
    panel_path: Option<&Path>,
    reference: Option<&Path>,
    threads: Option<usize>,
    thresholds: &ThresholdArgs,
) -> Result<()> {
    let panel = load_panel(panel_path)?;
    if let Some(fasta) = reference {
        panel
            .validate_reference(fasta)
            .with_context(|| format!("panel disagrees with reference {}", fasta.display()))?;
    }
    let config = resolve_config(&panel, thresholds)?;
    let outcome = pipeline::run_pipeline(&panel, &config, input_dir, out_dir, threads)
        .with_context(|| format!("run over {} failed", input_dir.display()))?;
    for result in outcome.report.results() {
        println!(
            "{}\t{}\t{}",
            result.sample_id,
            result.composite,
            result.genotype().unwrap_or_default()
        );
    }
    info!(units = outcome.units, failed = outcome.failed_units, "run finished");
    println!("{}", outcome.outputs.results_tsv.display());
    Ok(())
}

fn run_manifest(input_dir: &Path, out_dir: &Path, panel_path: Option<&Path>) -> Result<()> {
    let panel = load_panel(panel_path)?;
    let (_, manifest) = pipeline::plan_run(&panel, input_dir)
        .with_context(|| format!("failed to scan {}", input_dir.display()))?;
    let path = out_dir.join(layout::MANIFEST_FILE);
    manifest
        .write(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("{}", path.display());
    Ok(())
}
