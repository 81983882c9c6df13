use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, Level};
use verifydump::config::{self, AppConfig};
use verifydump::convert::{CancelToken, ConversionRequest, ConverterSet, Reconstruction, ToolRunner};
use verifydump::verify::WorkArea;
use verifydump::VerifyError;

#[derive(Parser)]
#[command(
    name = "convertdump",
    version,
    about = "Convert .chd/.rvz dumps back to Redump-style files"
)]
struct Cli {
    /// Show debug output, including every tool invocation.
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// Folder that receives the converted dump files.
    #[arg(long, alias = "output_folder", default_value = ".")]
    output_folder: PathBuf,

    /// System the dumps are for, either the full name from the Redump
    /// Datfile header or the short name used in Redump URLs (e.g. "dc").
    /// GD-ROM systems are converted through .gdi.
    #[arg(long)]
    system: Option<String>,

    #[arg(required = true)]
    dump_file: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(2)
        }
    }
}

/// Converts every dump, returning how many failed.
fn run(cli: &Cli) -> Result<usize> {
    let config = config::load_or_default()?;
    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || on_interrupt.cancel())
        .context("Failed to install Ctrl-C handler")?;

    let runner = ToolRunner::new(config.verification.tool_timeout(), cancel.clone());
    let converters = ConverterSet::standard(&config.tools);
    fs::create_dir_all(&cli.output_folder).with_context(|| {
        format!("Failed to create output folder {}", cli.output_folder.display())
    })?;

    let mut failed = 0;
    for dump in &cli.dump_file {
        if cancel.is_cancelled() {
            break;
        }
        if let Err(err) = convert_one(cli, &config, &converters, &runner, dump) {
            error!("Failed to convert \"{}\": {err}", dump.display());
            failed += 1;
        }
    }
    Ok(failed)
}

fn convert_one(
    cli: &Cli,
    config: &AppConfig,
    converters: &ConverterSet,
    runner: &ToolRunner,
    dump: &Path,
) -> Result<(), VerifyError> {
    let converter = converters
        .for_path(dump)
        .ok_or_else(|| VerifyError::UnsupportedFormat {
            extension: dump
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
                .unwrap_or_default(),
        })?;
    // Converted and normalised in private, so files already in the output
    // folder can't be mistaken for this dump's tracks.
    let work = WorkArea::new(config.verification.effective_work_dir()).acquire(dump)?;
    let request = ConversionRequest {
        source: dump,
        output_dir: work.dump_dir(),
        scratch_dir: work.scratch_dir(),
        system: cli.system.as_deref(),
        runner,
    };
    match converter.convert(&request)? {
        Reconstruction::Files => {
            let moved = work.move_dump_files(&cli.output_folder)?;
            info!(
                "Converted \"{}\" into {} ({})",
                dump.display(),
                cli.output_folder.display(),
                moved.join(", ")
            );
        }
        Reconstruction::Digest {
            file_name,
            algorithm,
            hex,
        } => println!("{file_name}: {algorithm} {hex}"),
    }
    Ok(())
}
