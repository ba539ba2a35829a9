//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use buildtail_client::{BitriseClient, ClientOptions};
use buildtail_core::{
    WatchConfig, WatchProgress, optimize_output_file, save_workflow_context, watch_build,
    write_summary,
};
use buildtail_shared::{
    AppConfig, PollConfig, ProcessConfig, WatchSummary, init_config, load_config,
    load_config_from, resolve_api_token,
};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// buildtail: follow a CI build log and reduce it for failure analysis.
#[derive(Parser)]
#[command(
    name = "buildtail",
    version,
    about = "Poll a Bitrise build log to a file and reduce it to the parts worth reading.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.buildtail/buildtail.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Poll a build's log until it finishes or the target marker appears.
    Watch(WatchArgs),

    /// Post-process an existing log file.
    Process(ProcessArgs),

    /// Save the app's bitrise.yml.
    Workflow(WorkflowArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
pub(crate) struct WatchArgs {
    /// API token (falls back to the env var named in the config file).
    #[arg(long, env = "BITRISE_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// App slug.
    #[arg(long, env = "BITRISE_APP_SLUG")]
    pub app: String,

    /// Build slug.
    #[arg(long, env = "BITRISE_BUILD_SLUG")]
    pub build: String,

    /// Seconds between polls (overrides config).
    #[arg(long, env = "interval")]
    pub interval: Option<u64>,

    /// File the raw log is written to.
    #[arg(short, long, env = "output_file")]
    pub output: PathBuf,

    /// Stop polling once a chunk contains this text (overrides config).
    #[arg(long)]
    pub target_marker: Option<String>,

    /// After polling, write the post-processed log here.
    #[arg(long)]
    pub optimized_output: Option<PathBuf>,

    /// After polling, save bitrise.yml into this directory.
    #[arg(long)]
    pub workflow_dir: Option<PathBuf>,

    /// Write the run summary as JSON here.
    #[arg(long)]
    pub summary: Option<PathBuf>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args)]
pub(crate) struct ProcessArgs {
    /// Log file to process.
    pub input: PathBuf,

    /// Output path (stdout if omitted).
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args)]
pub(crate) struct WorkflowArgs {
    /// API token (falls back to the env var named in the config file).
    #[arg(long, env = "BITRISE_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// App slug.
    #[arg(long, env = "BITRISE_APP_SLUG")]
    pub app: String,

    /// Directory to save bitrise.yml into.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
}

/// Post-processing flags shared by `watch` and `process`.
#[derive(Args)]
pub(crate) struct FilterArgs {
    /// Title of the step that failed.
    #[arg(long, env = "BITRISE_FAILED_STEP_TITLE", default_value = "")]
    pub failed_step_title: String,

    /// Error message of the failed step.
    #[arg(long, env = "BITRISE_FAILED_STEP_ERROR_MESSAGE", default_value = "")]
    pub failed_step_error: String,

    /// Enable keyword filtering of classified steps (overrides config).
    #[arg(long, env = "step_log_filter_patterns_enabled", value_parser = parse_switch)]
    pub filter_enabled: Option<bool>,

    /// Pattern table, one `type: kw1, kw2` per line (overrides config).
    #[arg(long, env = "step_log_filter_patterns")]
    pub filter_patterns: Option<String>,

    /// Only keep the failed step's log (overrides config).
    #[arg(long, env = "analyze_log_of_failed_step_only", value_parser = parse_switch)]
    pub failed_step_only: Option<bool>,
}

impl FilterArgs {
    /// Merge flags over the `[filtering]` config section.
    fn process_config(&self, config: &AppConfig) -> ProcessConfig {
        let mut process = ProcessConfig::from(config);
        process.failed_step_title = self.failed_step_title.clone();
        process.failed_step_error = self.failed_step_error.clone();
        if let Some(enabled) = self.filter_enabled {
            process.filtering_enabled = enabled;
        }
        if let Some(patterns) = &self.filter_patterns {
            process.filter_patterns = patterns.clone();
        }
        if let Some(focus) = self.failed_step_only {
            process.focus_failed_step_only = focus;
        }
        process
    }
}

/// Lenient boolean for step inputs: truthy words enable, anything else
/// (including an empty value) disables.
fn parse_switch(value: &str) -> std::result::Result<bool, String> {
    Ok(matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "on" | "1"
    ))
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
///
/// Logs go to stderr so `process` can stream its result to stdout.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "buildtail=info",
        1 => "buildtail=debug",
        _ => "buildtail=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Watch(args) => cmd_watch(&config, args).await,
        Command::Process(args) => cmd_process(&config, &args),
        Command::Workflow(args) => cmd_workflow(&config, &args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

fn build_client(config: &AppConfig, token: Option<&str>) -> Result<BitriseClient> {
    let token = resolve_api_token(config, token)?;
    let client = BitriseClient::new(&ClientOptions::from_api_config(&config.api, token))?;
    Ok(client)
}

async fn cmd_watch(config: &AppConfig, args: WatchArgs) -> Result<()> {
    let client = build_client(config, args.token.as_deref())?;

    let mut poll = PollConfig::from(config);
    if let Some(secs) = args.interval {
        poll.interval = Duration::from_secs(secs);
    }
    if let Some(marker) = &args.target_marker {
        poll.target_marker = marker.clone();
    }

    let watch_config = WatchConfig {
        app_slug: args.app.clone(),
        build_slug: args.build.clone(),
        output_file: args.output.clone(),
        poll,
    };

    info!(
        app = %args.app,
        build = %args.build,
        output = %args.output.display(),
        "watching build"
    );

    let reporter = CliProgress::new();
    let summary = watch_build(&watch_config, &client, &reporter).await?;

    // Collected logs are already on disk; a missing workflow file is not fatal.
    if let Some(dir) = &args.workflow_dir {
        if let Err(e) = save_workflow_context(&client, &args.app, dir).await {
            warn!(error = %e, "could not save workflow context");
        }
    }

    if let Some(path) = &args.optimized_output {
        let process_config = args.filter.process_config(config);
        optimize_output_file(&args.output, path, &process_config)
            .wrap_err("failed to write optimized log")?;
    }

    if let Some(path) = &args.summary {
        write_summary(&summary, path)?;
    }

    print_summary(&summary, &args.output, args.optimized_output.as_deref());
    Ok(())
}

fn cmd_process(config: &AppConfig, args: &ProcessArgs) -> Result<()> {
    let process_config = args.filter.process_config(config);

    match &args.out {
        Some(out) => {
            let written = optimize_output_file(&args.input, out, &process_config)?;
            info!(bytes = written, out = %out.display(), "processed log written");
        }
        None => {
            let raw = std::fs::read_to_string(&args.input)
                .wrap_err_with(|| format!("cannot read {}", args.input.display()))?;
            print!("{}", buildtail_steps::process(&raw, &process_config));
        }
    }

    Ok(())
}

async fn cmd_workflow(config: &AppConfig, args: &WorkflowArgs) -> Result<()> {
    let client = build_client(config, args.token.as_deref())?;
    let path = save_workflow_context(&client, &args.app, &args.dir).await?;
    println!("Saved workflow context to {}", path.display());
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_summary(summary: &WatchSummary, output: &Path, optimized: Option<&Path>) {
    let elapsed = summary.finished_at - summary.started_at;

    println!();
    println!("  Log collection finished ({}).", summary.stop_reason);
    println!("  Run:      {}", summary.run_id);
    println!("  Polls:    {}", summary.polls);
    println!("  Chunks:   {}", summary.chunks_written);
    println!("  Bytes:    {}", summary.bytes_written);
    println!("  Log:      {}", output.display());
    if let Some(path) = optimized {
        println!("  Reduced:  {}", path.display());
    }
    println!(
        "  Time:     {:.1}s",
        elapsed.num_milliseconds() as f64 / 1000.0
    );
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl WatchProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn chunk_written(&self, position: u64, total_bytes: u64) {
        self.spinner
            .set_message(format!("Fetched up to position {position} ({total_bytes} bytes)"));
    }

    fn waiting(&self, interval: Duration) {
        self.spinner
            .set_message(format!("Build running, next poll in {}s", interval.as_secs()));
    }

    fn done(&self, _summary: &WatchSummary) {
        self.spinner.finish_and_clear();
    }
}
