use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info, warn, Level};
use verifydump::cache::VerificationCache;
use verifydump::config;
use verifydump::convert::{CancelToken, ConverterSet, ToolRunner};
use verifydump::load_manifest;
use verifydump::report::RunReport;
use verifydump::verify::{collect_dumps, Pipeline, PipelineOptions, Verdict, WorkArea};

const EXIT_FATAL: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "verifydump",
    version,
    about = "Verify .chd/.rvz disc image dumps against a Redump Datfile"
)]
struct Cli {
    /// Show debug output, including every tool invocation.
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// Dumps verified concurrently. Default: config value, else one per CPU.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    jobs: Option<u32>,

    /// Seconds a single conversion tool may run before it is stopped.
    #[arg(long)]
    tool_timeout: Option<u64>,

    /// Echo the output of chdman, binmerge and DolphinTool.
    #[arg(long, default_value_t = false)]
    show_command_output: bool,

    /// Original .cue file, or a folder or .zip of them, used to check the
    /// essential structure of generated .cue files.
    #[arg(long)]
    extra_cue_source: Option<PathBuf>,

    /// Accept .cue files that don't match the Datfile instead of failing.
    #[arg(long, default_value_t = false)]
    allow_cue_file_mismatches: bool,

    /// Verify every dump even if an unchanged copy verified before.
    #[arg(long, default_value_t = false)]
    no_cache: bool,

    /// Write a JSON report of every verdict to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Folder for temporary reconstructed files. Default: system temp dir.
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Redump Datfile (.dat, or the .zip downloaded from redump.org).
    dat_file: PathBuf,

    /// Dump files, or folders searched recursively for .chd/.rvz files.
    #[arg(required = true)]
    dump_file_or_folder: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn init_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<u8> {
    let mut config = config::load_or_default()?;
    if let Some(jobs) = cli.jobs {
        config.verification.jobs = jobs;
    }
    if let Some(secs) = cli.tool_timeout {
        config.verification.tool_timeout_secs = secs;
    }
    if cli.allow_cue_file_mismatches {
        config.verification.allow_cue_file_mismatches = true;
    }
    if cli.work_dir.is_some() {
        config.verification.work_dir = cli.work_dir.clone();
    }
    if let Some(source) = &cli.extra_cue_source {
        if !source.exists() {
            bail!("Extra .cue file source \"{}\" doesn't exist", source.display());
        }
    }

    let manifest = load_manifest(&cli.dat_file)
        .with_context(|| format!("Failed to load Datfile {}", cli.dat_file.display()))?;

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || on_interrupt.cancel())
        .context("Failed to install Ctrl-C handler")?;

    let runner = ToolRunner::new(config.verification.tool_timeout(), cancel.clone())
        .show_output(cli.show_command_output);
    let converters = ConverterSet::standard(&config.tools);
    let work_area = WorkArea::new(config.verification.effective_work_dir());
    let discovered = collect_dumps(&cli.dump_file_or_folder, &converters);
    if discovered.dumps.is_empty() && discovered.rejected.is_empty() {
        warn!("No .chd or .rvz dumps found");
    }

    let cache_path = if config.cache.enabled && !cli.no_cache {
        Some(config.cache.resolved_path()?)
    } else {
        None
    };
    let mut cache = cache_path
        .as_deref()
        .map(VerificationCache::load_or_empty)
        .unwrap_or_default();

    let started_at = Utc::now();
    let options = PipelineOptions {
        allow_cue_file_mismatches: config.verification.allow_cue_file_mismatches,
        extra_cue_source: cli.extra_cue_source.clone(),
    };
    let verdicts = {
        let mut pipeline = Pipeline::new(&manifest, &converters, &work_area, &runner, options);
        if cache_path.is_some() {
            pipeline = pipeline.with_cache(&cache);
        }
        let mut verdicts = pipeline.run(&discovered.dumps, config.verification.effective_jobs())?;
        verdicts.extend(
            discovered
                .rejected
                .iter()
                .map(|(path, err)| Verdict::rejected(path.clone(), err)),
        );
        pipeline.sort_verdicts(&mut verdicts);
        verdicts
    };

    if cancel.is_cancelled() {
        warn!("Verification cancelled; temporary files were removed");
        return Ok(EXIT_CANCELLED);
    }

    if let Some(path) = &cache_path {
        let added = cache.remember(&verdicts, &manifest);
        if added > 0 {
            match cache.save(path) {
                Ok(()) => info!("Remembered {added} verified dump(s) in {}", path.display()),
                Err(err) => warn!("{err:#}"),
            }
        }
    }

    let report = RunReport::new(manifest.system().map(str::to_string), started_at, verdicts);
    for line in report.summary_lines() {
        println!("{line}");
    }
    if let Some(path) = &cli.report {
        report.write_json(path)?;
        println!("Report written to {}", path.display());
    }
    debug!("Run {} finished", report.run_id);
    Ok(report.exit_code() as u8)
}
