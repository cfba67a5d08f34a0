use std::cell::Cell;
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use manga_watermark_removal::config::default_config_path;
use manga_watermark_removal::{
    CancellationToken, Config, ConfigStore, OutputFormat, Pipeline, Rect, RemoveWatermarkEvent,
    Result, DEFAULT_MIN_SAMPLES,
};

#[derive(Parser)]
#[command(
    name = "manga-watermark",
    about = "Remove static semi-transparent watermarks from batches of manga pages",
    version,
    after_help = "Typical usage:\n  \
                  manga-watermark scan <dir>\n  \
                  manga-watermark generate <dir>\n  \
                  manga-watermark remove <dir> -o <output_dir>\n\n\
                  NOTE: Each page size needs enough pages (default 8) for its background \
                  to be estimated. Moving or per-page watermarks are not supported."
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file (default: platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the page sizes of a manga directory and their background state
    Scan {
        /// Manga directory
        dir: PathBuf,
    },

    /// Estimate and cache backgrounds (every page size unless one is given)
    Generate {
        /// Manga directory
        dir: PathBuf,

        /// Width of the page size to process
        #[arg(long, requires = "height")]
        width: Option<u32>,

        /// Height of the page size to process
        #[arg(long, requires = "width")]
        height: Option<u32>,

        /// Only analyse this region: LEFT,TOP,RIGHT,BOTTOM
        #[arg(long, value_parser = parse_rect, requires = "width")]
        rect: Option<Rect>,

        /// Minimum number of pages a size needs
        #[arg(long, default_value_t = DEFAULT_MIN_SAMPLES)]
        min_samples: usize,
    },

    /// Remove watermarks using the cached backgrounds
    Remove {
        /// Manga directory
        dir: PathBuf,

        /// Output directory (default: from config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (default: from config)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Run the lossless size-reduction pass (default: from config)
        #[arg(long)]
        optimize: Option<bool>,

        /// Worker threads (default: available parallelism)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Print where the background of a page size is cached
    CachePath {
        /// Manga directory
        dir: PathBuf,

        /// Page width
        #[arg(long)]
        width: u32,

        /// Page height
        #[arg(long)]
        height: u32,

        /// Print the absolute path
        #[arg(long)]
        absolute: bool,
    },

    /// Show or change the saved output settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current settings as JSON
    Show,

    /// Change and save settings
    Set {
        /// Output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Run the lossless size-reduction pass
        #[arg(long)]
        optimize: Option<bool>,
    },
}

fn parse_rect(s: &str) -> std::result::Result<Rect, String> {
    let parts: Vec<u32> = s
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid rect `{s}`: {e}"))?;
    match parts[..] {
        [left, top, right, bottom] => Ok(Rect::new(left, top, right, bottom)),
        _ => Err(format!("rect `{s}` must be LEFT,TOP,RIGHT,BOTTOM")),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the command ran but some items failed.
fn run(cli: Cli) -> Result<bool> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let quiet = cli.quiet;

    match cli.command {
        Command::Scan { dir } => {
            let groups = Pipeline::new().get_manga_dir_data(&dir)?;
            if groups.is_empty() {
                eprintln!("No images found in {}", dir.display());
            }
            for group in groups {
                let state = if group.black_background.is_some() {
                    "cached"
                } else {
                    "missing"
                };
                println!(
                    "{}x{}\t{} pages\tbackground: {state}",
                    group.width, group.height, group.count
                );
            }
            Ok(true)
        }

        Command::Generate {
            dir,
            width,
            height,
            rect,
            min_samples,
        } => {
            let pipeline = Pipeline::new().with_min_samples(min_samples);
            let sizes: Vec<(u32, u32)> = match (width, height) {
                (Some(w), Some(h)) => vec![(w, h)],
                _ => pipeline
                    .get_manga_dir_data(&dir)?
                    .iter()
                    .map(|g| (g.width, g.height))
                    .collect(),
            };

            let mut ok = true;
            for (w, h) in sizes {
                match pipeline.generate_background(&dir, rect, w, h) {
                    Ok(()) => {
                        if !quiet {
                            eprintln!("[OK] {w}x{h}");
                        }
                    }
                    Err(e) => {
                        eprintln!("[FAIL] {w}x{h}: {e}");
                        ok = false;
                    }
                }
            }
            Ok(ok)
        }

        Command::Remove {
            dir,
            output,
            format,
            optimize,
            workers,
        } => {
            let store = ConfigStore::load(&config_path)?;
            let config = store.get();
            let output_dir = output.unwrap_or_else(|| config.output_dir.clone());
            let format = format.unwrap_or(config.output_format);
            let optimize = optimize.unwrap_or(config.output_optimize);

            let mut pipeline = Pipeline::new();
            pipeline.workers = workers;
            let backgrounds = pipeline.load_cached_backgrounds(&dir)?;
            if backgrounds.is_empty() {
                eprintln!("WARNING: no cached backgrounds, run `generate` first");
            }

            let total = Cell::new(0u32);
            let sink = |event: RemoveWatermarkEvent| match event {
                RemoveWatermarkEvent::Start { total: t, .. } => total.set(t),
                RemoveWatermarkEvent::Success {
                    img_path, current, ..
                } => {
                    if !quiet {
                        eprintln!("[OK] {} ({current}/{})", img_path.display(), total.get());
                    }
                }
                RemoveWatermarkEvent::Error {
                    img_path, err_msg, ..
                } => eprintln!("[FAIL] {}: {err_msg}", img_path.display()),
                RemoveWatermarkEvent::End { .. } => {}
            };

            let summary = pipeline.remove_watermark(
                &dir,
                &output_dir,
                format,
                optimize,
                backgrounds,
                &sink,
                &CancellationToken::new(),
            )?;

            if !quiet {
                eprintln!();
                eprint!("[Summary] Processed: {}", summary.succeeded);
                if summary.failed > 0 {
                    eprint!(", Failed: {}", summary.failed);
                }
                eprintln!(" (Total: {}) -> {}", summary.total, output_dir.display());
            }
            Ok(summary.failed == 0)
        }

        Command::CachePath {
            dir,
            width,
            height,
            absolute,
        } => {
            let pipeline = Pipeline::new();
            let path = if absolute {
                pipeline.get_background_dir_abs_path(&dir, width, height)?
            } else {
                pipeline.get_background_dir_relative_path(&dir, width, height)?
            };
            println!("{}", path.display());
            Ok(true)
        }

        Command::Config { action } => {
            let mut store = ConfigStore::load(&config_path)?;
            match action {
                ConfigAction::Show => {}
                ConfigAction::Set {
                    output_dir,
                    format,
                    optimize,
                } => {
                    let current = store.get().clone();
                    store.save(Config {
                        output_dir: output_dir.unwrap_or(current.output_dir),
                        output_format: format.unwrap_or(current.output_format),
                        output_optimize: optimize.unwrap_or(current.output_optimize),
                    })?;
                }
            }
            let text = serde_json::to_string_pretty(store.get()).map_err(|source| {
                manga_watermark_removal::Error::Config {
                    path: store.path().to_path_buf(),
                    source,
                }
            })?;
            println!("{text}");
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_optimize_can_override_config_either_way() {
        for (arg, expected) in [("true", Some(true)), ("false", Some(false))] {
            let cli = Cli::try_parse_from(["manga-watermark", "remove", "vol", "--optimize", arg])
                .unwrap();
            let Command::Remove { optimize, .. } = cli.command else {
                panic!("expected remove");
            };
            assert_eq!(optimize, expected);
        }

        let cli = Cli::try_parse_from(["manga-watermark", "remove", "vol"]).unwrap();
        assert!(matches!(cli.command, Command::Remove { optimize: None, .. }));
    }

    #[test]
    fn parse_rect_accepts_four_edges() {
        assert_eq!(parse_rect("1, 2,30,40").unwrap(), Rect::new(1, 2, 30, 40));
        assert!(parse_rect("1,2,3").is_err());
        assert!(parse_rect("a,b,c,d").is_err());
    }
}
