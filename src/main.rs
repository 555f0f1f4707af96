use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use uiflow::cli::commands::{self, RunOptions};

#[derive(Parser)]
#[command(name = "uiflow", about = "Run declarative YAML UI test trees", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a test tree against a browser
    Run {
        /// Root test file
        file: PathBuf,

        /// Run configuration (default: uiflow.yaml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// WebDriver server URL
        #[arg(long)]
        webdriver: Option<String>,

        /// Browser: chrome, msedge, firefox, safari
        #[arg(long)]
        browser: Option<String>,

        /// Run the browser without a window
        #[arg(long)]
        headless: bool,

        /// Report format: yaml, json, junit
        #[arg(short, long)]
        format: Option<String>,

        /// Report file (default: <outputDir>/report.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip remaining children after one fails
        #[arg(long)]
        stop_on_child_failure: bool,

        /// Do not navigate back to the parent URL between children
        #[arg(long)]
        no_restore: bool,

        /// Keep evaluating assertions after one fails
        #[arg(long)]
        continue_on_assertion_failure: bool,

        /// List passing steps too
        #[arg(short, long)]
        verbose: bool,
    },

    /// Load test trees and check every referenced file
    Validate {
        /// Root test files
        files: Vec<PathBuf>,
    },

    /// Output the inclusion graph of a test tree
    Visualize {
        /// Root test file
        file: PathBuf,

        /// Output format: dot, mermaid
        #[arg(short, long, default_value = "dot")]
        format: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Run {
            file,
            config,
            webdriver,
            browser,
            headless,
            format,
            output,
            stop_on_child_failure,
            no_restore,
            continue_on_assertion_failure,
            verbose,
        }) => {
            let options = RunOptions {
                config,
                webdriver,
                browser,
                headless,
                format,
                output,
                stop_on_child_failure,
                no_restore,
                continue_on_assertion_failure,
                verbose,
            };
            match commands::run_run(&file, &options) {
                Ok(outcome) => {
                    println!("{}", outcome.console);
                    println!("report written to {}", outcome.report_path.display());
                    if !outcome.passed {
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Validate { files }) => {
            if files.is_empty() {
                eprintln!("error: no input files provided");
                std::process::exit(1);
            }
            match commands::run_validate(&files) {
                Ok(result) => println!("{result}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Visualize {
            file,
            format,
            output,
        }) => match commands::run_visualize(&file, &format, output.as_ref()) {
            Ok(result) => print!("{result}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        },
        None => {
            // no subcommand: print help
            Cli::parse_from(["uiflow", "--help"]);
        }
    }
}
