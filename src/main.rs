use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gst_verify::config::{self, ServerMode, Timeouts, VerifyConfig};
use gst_verify::errors::{VerifyError, VerifyResult};
use gst_verify::runner::{self, Runner, ScenarioKind};
use gst_verify::server;
use gst_verify::types::{OutputFormat, RunReport, ViewportSize};
use gst_verify::webdriver::BrowserType;
use gst_verify::webdriver_manager::GLOBAL_WEBDRIVER_MANAGER;
use gst_verify::HeaderPolicy;

const EXIT_SUCCESS: i32 = 0;
const SUCCESS_LINE: &str = "Verification script ran successfully.";

#[derive(Parser)]
#[command(name = "gst-verify")]
#[command(about = "End-to-end verification for the GST Reconciliation tool", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Options for the default full run
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a fixture and verify the supplier dropdowns (default)
    Run(RunArgs),

    /// Check that the startup screen renders
    Smoke(RunArgs),

    /// Write the spreadsheet fixture and keep it
    Fixture {
        /// Where to write the workbook
        #[arg(short, long, default_value = "test_data.xlsx")]
        output: PathBuf,

        /// JSON array of row objects replacing the built-in rows
        #[arg(long)]
        fixture_json: Option<PathBuf>,

        /// How to build the header when rows have different columns
        #[arg(long, value_enum, default_value = "first-row")]
        header_policy: HeaderPolicy,
    },

    /// Serve a directory over HTTP until interrupted
    Serve {
        /// Directory to serve
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Port to listen on
        #[arg(long, default_value_t = config::DEFAULT_PORT)]
        port: u16,

        /// Stop when stdin is closed (set when a run owns the server)
        #[arg(long, hide = true)]
        watch_stdin: bool,
    },
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Directory holding the application page
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Port for the static server
    #[arg(long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Page file name, relative to the root
    #[arg(long, default_value = config::DEFAULT_PAGE)]
    page: String,

    /// Directory for the fixture and the screenshot
    #[arg(long, default_value = config::DEFAULT_SCRATCH_DIR)]
    scratch_dir: PathBuf,

    /// JSON array of row objects replacing the built-in rows
    #[arg(long)]
    fixture_json: Option<PathBuf>,

    /// How to build the header when rows have different columns
    #[arg(long, value_enum, default_value = "first-row")]
    header_policy: HeaderPolicy,

    /// Browser to use
    #[arg(short, long, value_enum, default_value = "chrome")]
    browser: BrowserType,

    /// Run browser in visible mode (disables headless)
    #[arg(long = "no-headless")]
    no_headless: bool,

    /// Set viewport size (WIDTHxHEIGHT, e.g., 1920x1080)
    #[arg(long)]
    viewport: Option<String>,

    /// Use a server that is already running instead of spawning one
    #[arg(long)]
    external_server: bool,

    /// Bound for the loader overlay to appear, in ms
    #[arg(long, default_value_t = 5000)]
    loader_timeout_ms: u64,

    /// Bound for the loader overlay to disappear, in ms
    #[arg(long, default_value_t = 10000)]
    processing_timeout_ms: u64,

    /// Bound for the dashboard to appear, in ms
    #[arg(long, default_value_t = 5000)]
    dashboard_timeout_ms: u64,

    /// Bound for every other expectation, in ms
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Bound for the static server to answer, in ms
    #[arg(long, default_value_t = 10000)]
    server_timeout_ms: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value = "simple")]
    format: OutputFormat,

    /// Leave the fixture on disk after the run
    #[arg(long)]
    keep_fixture: bool,
}

impl RunArgs {
    fn into_config(self) -> anyhow::Result<VerifyConfig> {
        let viewport = self.viewport.as_deref().map(ViewportSize::parse).transpose()?;
        let config = VerifyConfig {
            root: self.root,
            port: self.port,
            page: self.page,
            scratch_dir: self.scratch_dir,
            fixture_json: self.fixture_json,
            header_policy: self.header_policy,
            browser: self.browser,
            headless: !self.no_headless,
            viewport,
            server: if self.external_server {
                ServerMode::External
            } else {
                ServerMode::Spawn
            },
            timeouts: Timeouts {
                loader_visible: Duration::from_millis(self.loader_timeout_ms),
                loader_hidden: Duration::from_millis(self.processing_timeout_ms),
                dashboard_visible: Duration::from_millis(self.dashboard_timeout_ms),
                default: Duration::from_millis(self.timeout_ms),
                server_startup: Duration::from_millis(self.server_timeout_ms),
            },
            format: self.format,
            keep_fixture: self.keep_fixture,
        };
        Ok(config.absolutize(&std::env::current_dir()?))
    }
}

#[tokio::main]
async fn main() {
    let result = run().await;

    // Always clean up WebDriver processes before exiting
    GLOBAL_WEBDRIVER_MANAGER.stop_all();

    match result {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            // JSON error on stdout for programmatic consumption
            let error_json = json!({
                "error": true,
                "message": err.to_string(),
                "exit_code": err.exit_code()
            });
            println!(
                "{}",
                serde_json::to_string(&error_json).unwrap_or_else(|_| "{}".to_string())
            );

            eprintln!("Error: {}", err);
            std::process::exit(err.exit_code());
        }
    }
}

async fn run() -> VerifyResult<()> {
    // Logs go to stderr so stdout stays clean for reports
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gst_verify=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        None => verify(cli.run, ScenarioKind::SupplierDropdowns).await,
        Some(Commands::Run(args)) => verify(args, ScenarioKind::SupplierDropdowns).await,
        Some(Commands::Smoke(args)) => verify(args, ScenarioKind::Smoke).await,
        Some(Commands::Fixture {
            output,
            fixture_json,
            header_policy,
        }) => {
            let config = VerifyConfig {
                fixture_json,
                header_policy,
                ..VerifyConfig::default()
            };
            let written = runner::write_fixture(&config, &output)?;
            println!("Fixture written to: {}", written.display());
            Ok(())
        }
        Some(Commands::Serve {
            root,
            port,
            watch_stdin,
        }) => {
            let root = server::resolve_root(&root)
                .map_err(|e| VerifyError::ServerStart(format!("{e:#}")))?;
            server::serve(&root, port, watch_stdin)
                .await
                .map_err(|e| VerifyError::ServerStart(format!("{e:#}")))
        }
    }
}

async fn verify(args: RunArgs, kind: ScenarioKind) -> VerifyResult<()> {
    let config = args.into_config()?;
    let format = config.format;
    let program = std::env::current_exe()
        .map_err(|e| VerifyError::ServerStart(format!("cannot locate own binary: {}", e)))?;

    let report = Runner::new(config, program).run(kind).await?;
    print_report(&report, format);
    Ok(())
}

fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Simple => println!("{}", SUCCESS_LINE),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
        ),
    }
}
