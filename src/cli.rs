use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::cursor_store::{CursorStore, JsonCursorStore};
use crate::error::IteratorError;
use crate::iterator::ImageIterator;
use crate::output::{self, OutputMode};
use crate::scan_spec::Invocation;
use crate::theme::Theme;
use crate::utils::display_path;

#[derive(Parser)]
#[command(name = "batch-flow")]
#[command(version)]
#[command(about = "Serve the images of a directory one at a time, resuming where the last run stopped")]
#[command(long_about = "batch-flow keeps a persistent cursor over the image files of a directory. \
    Each call to `next` decodes the file under the cursor, advances it and saves it, so \
    repeated runs walk the whole collection and wrap around at the end.\n\n\
    Examples:\n  \
    batch-flow next ./input                 # Serve the next image\n  \
    batch-flow next ./input --count 5       # Serve five in a row\n  \
    batch-flow next ./input --no-recursive --extensions png\n  \
    batch-flow status --json                # Inspect the stored cursor\n  \
    batch-flow reset                        # Start over on the next call")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the next image and advance the cursor
    #[command(visible_alias = "n")]
    Next {
        /// Directory to iterate [default: config scan.root, then current directory]
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,

        /// Descend into subdirectories
        #[arg(long, overrides_with = "no_recursive")]
        recursive: bool,

        /// Only consider files directly under PATH
        #[arg(long, overrides_with = "recursive")]
        no_recursive: bool,

        /// Comma-separated extensions to accept (e.g., "png,jpg")
        #[arg(short = 'e', long, value_name = "LIST")]
        extensions: Option<String>,

        /// Always decode to RGB, discarding any alpha channel
        #[arg(long)]
        no_alpha: bool,

        /// Rescan on every call and restart when the file set changed
        #[arg(long, overrides_with = "no_auto_refresh")]
        auto_refresh: bool,

        /// Trust the stored list while parameters are unchanged
        #[arg(long, overrides_with = "auto_refresh")]
        no_auto_refresh: bool,

        /// Number of images to serve
        #[arg(short = 'n', long, default_value = "1", value_name = "N")]
        count: usize,

        /// Output one JSON object per served image
        #[arg(long)]
        json: bool,

        /// Cursor record to use instead of the configured one
        #[arg(long, value_name = "FILE")]
        state: Option<PathBuf>,
    },

    /// Show the stored cursor
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Cursor record to inspect
        #[arg(long, value_name = "FILE")]
        state: Option<PathBuf>,
    },

    /// Forget the stored cursor
    Reset {
        /// Cursor record to remove
        #[arg(long, value_name = "FILE")]
        state: Option<PathBuf>,
    },

    /// View or reset configuration
    Config {
        /// Display current configuration
        #[arg(long)]
        show: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

/// Collapse a `--flag` / `--no-flag` pair; `None` when neither was given.
fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let output_mode = OutputMode::from_flags(self.verbose, self.quiet);

        match self.command {
            Commands::Next {
                path,
                recursive,
                no_recursive,
                extensions,
                no_alpha,
                auto_refresh,
                no_auto_refresh,
                count,
                json,
                state,
            } => {
                let mut config = Config::load();
                config.apply_cli_overrides(
                    extensions,
                    flag_pair(recursive, no_recursive),
                    no_alpha.then_some(false),
                    flag_pair(auto_refresh, no_auto_refresh),
                    state,
                );

                let root = path
                    .or_else(|| config.scan.root.clone())
                    .unwrap_or_else(|| PathBuf::from("."));
                let invocation = Invocation {
                    root_path: root.to_string_lossy().into_owned(),
                    recursive: config.scan.recursive,
                    extensions: config.scan.extensions.clone(),
                    allow_transparency: config.scan.allow_transparency,
                    auto_refresh: config.scan.auto_refresh,
                };

                let mut iter = ImageIterator::builder()
                    .store(JsonCursorStore::new(config.state_path()))
                    .prefetch_window(config.prefetch.window)
                    .build()?;

                for _ in 0..count.max(1) {
                    match iter.next_invocation(&invocation) {
                        Ok(served) => {
                            if json {
                                output::print_served_json(&served)?;
                            } else {
                                output::print_served_human(&served, output_mode);
                            }
                        }
                        // The cursor already moved past the bad file
                        Err(e @ IteratorError::Decode { .. }) if count > 1 => {
                            if output_mode != OutputMode::Quiet {
                                eprintln!("{} {}", Theme::warning("Skipped:"), e);
                            }
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            Commands::Status { json, state } => {
                let mut config = Config::load();
                config.apply_cli_overrides(None, None, None, None, state);
                let store = JsonCursorStore::new(config.state_path());
                let current = store.load();
                if json {
                    output::print_status_json(&current, &store.location())?;
                } else {
                    output::print_status_human(&current, &store.location());
                }
            }

            Commands::Reset { state } => {
                let mut config = Config::load();
                config.apply_cli_overrides(None, None, None, None, state);
                let store = JsonCursorStore::new(config.state_path());
                store.clear()?;
                if output_mode != OutputMode::Quiet {
                    println!(
                        "{} Cursor cleared ({}).",
                        Theme::success("OK"),
                        display_path(store.path())
                    );
                }
            }

            Commands::Config { show: _, reset } => {
                if reset {
                    Config::default().save()?;
                    println!("{} Configuration reset to defaults.", Theme::success("OK"));
                } else {
                    let config = Config::load_or_create();
                    println!("{}", Theme::header("Current Configuration"));
                    println!("{}", Theme::divider_bold(60));
                    println!();
                    println!("Scan:");
                    match &config.scan.root {
                        Some(root) => println!("  Root: {}", display_path(root)),
                        None => println!("  Root: (current directory)"),
                    }
                    println!("  Extensions: {}", config.scan.extensions);
                    println!("  Recursive: {}", config.scan.recursive);
                    println!("  Allow transparency: {}", config.scan.allow_transparency);
                    println!("  Auto refresh: {}", config.scan.auto_refresh);
                    println!();
                    println!("State:");
                    println!("  Cursor record: {}", display_path(&config.state_path()));
                    println!();
                    println!("Prefetch:");
                    println!("  Window: {}", config.prefetch.window);
                    println!();
                    if let Ok(path) = Config::config_path() {
                        println!("Config file: {}", Theme::command(&display_path(&path)));
                    }
                }
            }
        }

        Ok(())
    }
}
