//! CLI entry point for clipper
//!
//! `clipper watch` runs the watch-folder daemon; the other subcommands run
//! one pipeline stage by hand.

use clap::{Parser, Subcommand};
use clipper_daemon::config::expand_home;
use clipper_daemon::encode::{EncodePlan, TranscodeParams};
use clipper_daemon::{convention, presets, Config, Convention, Daemon, Supervisor};
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type CliResult = Result<(), Box<dyn Error>>;

/// Clipper - compress, trim and convert clips by dropping them in a folder
#[derive(Parser, Debug)]
#[command(name = "clipper")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "~/.config/clipper/config.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Skip the ffmpeg/ffprobe availability checks
    #[arg(long, global = true)]
    skip_checks: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the inbox and process dropped files (default)
    Watch {
        /// Watch base directory, overriding the configuration
        #[arg(short, long)]
        base: Option<PathBuf>,
    },
    /// Probe a media file and print its metadata
    Info { file: PathBuf },
    /// Transcode one file in place of dropping it in the inbox
    Compress {
        file: PathBuf,
        /// Preset name, overriding the one in the filename
        #[arg(short, long)]
        preset: Option<String>,
        /// Output path; defaults to the conventional name beside the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show how a filename would be processed
    Parse { name: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let config_path = expand_home(&args.config);
    let mut config = match Config::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", config_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = match args.command.unwrap_or(Command::Watch { base: None }) {
        Command::Watch { base } => {
            if let Some(base) = base {
                config.folders.watch_base = base;
            }
            watch(config, args.skip_checks).await
        }
        Command::Info { file } => info(&config, &file).await,
        Command::Compress {
            file,
            preset,
            output,
        } => compress(&config, &file, preset.as_deref(), output).await,
        Command::Parse { name } => parse(&config, &name),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn watch(config: Config, skip_checks: bool) -> CliResult {
    let daemon = if skip_checks {
        log::warn!("skipping startup checks (--skip-checks enabled)");
        Daemon::new_without_checks(config)?
    } else {
        Daemon::new(config).await?
    };

    log::info!("drop files into {}", daemon.folders.inbox.display());
    daemon
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("cannot listen for ctrl-c: {}", e);
            }
        })
        .await?;
    Ok(())
}

async fn info(config: &Config, file: &Path) -> CliResult {
    let info = Supervisor::new(&config.tools).probe(file).await?;
    println!("{}", info.path.display());
    println!("  dimensions  {}x{}", info.width, info.height);
    println!("  duration    {:.2}s", info.duration);
    println!("  codec       {}", info.codec);
    println!("  frame rate  {:.2} fps", info.fps);
    println!("  bitrate     {} kb/s", info.bitrate / 1000);
    println!("  size        {} bytes", info.size_bytes);
    Ok(())
}

/// Convention for `name`, falling back like the scheduler does.
fn convention_for(name: &str) -> (Convention, Option<String>) {
    match convention::parse(name) {
        Ok(convention) => (convention, None),
        Err(e) => (Convention::fallback(name), Some(e.to_string())),
    }
}

fn resolve_preset(
    config: &Config,
    convention: &Convention,
    explicit: Option<&str>,
) -> Result<&'static presets::Preset, Box<dyn Error>> {
    let name = match (explicit, convention.preset) {
        (Some(name), _) => name,
        (None, Some(preset)) => return Ok(preset),
        (None, None) => config.presets.default.as_str(),
    };
    presets::lookup(name).ok_or_else(|| {
        let known: Vec<&str> = presets::all().iter().map(|p| p.name).collect();
        format!("unknown preset '{}' (known: {})", name, known.join(", ")).into()
    })
}

async fn compress(
    config: &Config,
    file: &Path,
    preset: Option<&str>,
    output: Option<PathBuf>,
) -> CliResult {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("{} is not a file", file.display()))?;
    let (convention, parse_error) = convention_for(&name);
    if let Some(e) = parse_error {
        log::warn!("{}: {}, using standard compression", name, e);
    }
    let preset = resolve_preset(config, &convention, preset)?;
    let output = output.unwrap_or_else(|| file.with_file_name(convention.output_name(preset)));

    let plan = EncodePlan::for_mode(convention.mode(), preset, &config.gif, &config.loop_);
    let params = TranscodeParams::new(file.to_path_buf(), output, plan, convention.trim);
    let supervisor = Supervisor::new(&config.tools);

    let result = supervisor
        .transcode(&params, None, |fraction| {
            eprint!("\r{:>3.0}%", fraction * 100.0);
            let _ = std::io::stderr().flush();
        })
        .await;
    eprintln!();
    let result = result?;

    println!(
        "{} ({} -> {} bytes, {:.1}% smaller)",
        result.output_path.display(),
        result.original_size,
        result.compressed_size,
        result.reduction_percent
    );
    Ok(())
}

fn parse(config: &Config, name: &str) -> CliResult {
    let (convention, parse_error) = convention_for(name);
    if let Some(e) = parse_error {
        println!("{}: {} (falling back to standard)", name, e);
    }
    let preset = resolve_preset(config, &convention, None)?;
    let seconds = |t: Option<f64>| t.map(|s| format!("{}s", s)).unwrap_or_else(|| "-".into());

    println!("mode    {}", convention.mode());
    println!(
        "preset  {}{}",
        preset.name,
        if convention.preset.is_none() { " (default)" } else { "" }
    );
    println!("trim    {} to {}", seconds(convention.trim.start), seconds(convention.trim.end));
    println!("output  {}", convention.output_name(preset));
    Ok(())
}
