use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::Serialize;
use tokio::io::BufReader;
use tracing::{debug, info};

use deltafold::auxiliary::{AuxiliarySink, ChannelSink, NullSink};
use deltafold::feed::{FeedSummary, run_jsonl};
use deltafold::settings::{APP_NAME, AppConfig, default_config_dir, expand_path};
use deltafold::{ArtifactState, Delta, ResearchState, StreamProcessor};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_replay(ctx: RuntimeContext, cmd: ReplayCommand) -> Result<()> {
    handle_replay(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging();
    debug!("config file: {}", ctx.config_file.display());

    match cli.command {
        Command::Replay(cmd) => async_replay(ctx, cmd),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Deltafold - fold streamed deltas into artifact and research state.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    /// Emit additional diagnostics for troubleshooting
    #[arg(long = "diagnostics", global = true)]
    diagnostics: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fold a JSONL delta stream and print the final state
    Replay(ReplayCommand),
    /// Create a default config file
    Init(InitCommand),
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ReplayCommand {
    /// Delta stream, one JSON object per line ("-" for stdin)
    #[arg(value_name = "FILE", default_value = "-")]
    input: PathBuf,
    /// Also print deltas forwarded to auxiliary channels
    #[arg(long = "show-aux")]
    show_aux: bool,
}

#[derive(Debug, Clone, Args)]
struct InitCommand {
    /// Recreate configuration even if it already exists
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_file: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_file = resolve_config_path(common.config.clone())?;
        let config = AppConfig::load(&config_file)
            .with_context(|| format!("loading config from {}", config_file.display()))?;
        Ok(Self {
            common,
            config_file,
            config,
        })
    }

    fn init_logging(&self) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        let level = self.effective_log_level();
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{APP_NAME}={level}")));

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(io::stderr),
                )
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!disable_color)
                        .with_target(self.common.diagnostics)
                        .with_file(self.common.diagnostics)
                        .with_line_number(self.common.diagnostics),
                )
                .try_init()
                .ok();
        }
    }

    fn effective_log_level(&self) -> &str {
        if self.common.quiet {
            "error"
        } else if self.common.trace {
            "trace"
        } else if self.common.debug {
            "debug"
        } else {
            match self.common.verbose {
                0 => self.config.logging.level.as_str(),
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

fn resolve_config_path(input: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = input {
        return match path.to_str() {
            Some(text) => Ok(expand_path(text)?),
            None => Ok(path),
        };
    }
    let dir = default_config_dir().ok_or_else(|| anyhow!("unable to determine config directory"))?;
    Ok(dir.join("config.toml"))
}

// ============================================================================
// Replay
// ============================================================================

#[derive(Serialize)]
struct ReplayOutput<'a> {
    artifact: Option<&'a ArtifactState>,
    research: &'a ResearchState,
    progress_percent: f64,
    summary: &'a FeedSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    auxiliary: Vec<Delta>,
}

async fn handle_replay(ctx: &RuntimeContext, cmd: ReplayCommand) -> Result<()> {
    let registry = ctx.config.registry()?;
    debug!(
        "registered kinds: {:?}",
        registry.kinds().collect::<Vec<_>>()
    );

    let (channel_sink, mut aux_rx) = ChannelSink::new();
    let sink: Arc<dyn AuxiliarySink> = if cmd.show_aux {
        Arc::new(channel_sink)
    } else {
        Arc::new(NullSink)
    };

    let mut processor =
        StreamProcessor::new(registry).with_auxiliary(ctx.config.auxiliary_routes(), sink);
    if let Some(store) = ctx.config.document_store()? {
        info!("persisting finished documents to {}", store.dir().display());
        processor = processor.with_store(Arc::new(store));
    }

    let summary = if cmd.input.as_os_str() == "-" {
        run_jsonl(BufReader::new(tokio::io::stdin()), &mut processor).await
    } else {
        let file = tokio::fs::File::open(&cmd.input)
            .await
            .with_context(|| format!("opening {}", cmd.input.display()))?;
        run_jsonl(BufReader::new(file), &mut processor).await
    }
    .context("reading delta stream")?;

    let mut auxiliary = Vec::new();
    while let Ok(delta) = aux_rx.try_recv() {
        auxiliary.push(delta);
    }

    let research = processor.research();
    let output = ReplayOutput {
        artifact: processor.artifact().map(|state| &**state),
        research,
        progress_percent: research.progress_percent(),
        summary: &summary,
        auxiliary,
    };

    if ctx.common.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serializing replay output")?
        );
    } else {
        print_replay(&output, ctx.common.diagnostics)?;
    }
    Ok(())
}

fn print_replay(output: &ReplayOutput<'_>, verbose: bool) -> Result<()> {
    let mut out = io::stdout().lock();

    match output.artifact {
        Some(state) => {
            writeln!(
                out,
                "artifact  {} {:?} ({}, {}, {})",
                state.document_id.as_deref().unwrap_or("-"),
                state.title,
                state.kind,
                if state.is_streaming() { "streaming" } else { "idle" },
                if state.is_visible { "visible" } else { "hidden" },
            )?;
            writeln!(out, "          {} chars", state.content_len())?;
        }
        None => writeln!(out, "artifact  none")?,
    }

    let research = output.research;
    let outcome = match (&research.error, research.completed) {
        (Some(error), _) => format!("failed: {error}"),
        (None, true) => "complete".to_string(),
        (None, false) => "running".to_string(),
    };
    writeln!(
        out,
        "research  depth {}/{}, {}/{} steps ({:.0}%), {} sources, {outcome}",
        research.current_depth,
        research.max_depth,
        research.completed_steps,
        research.total_expected_steps,
        output.progress_percent,
        research.sources.len(),
    )?;

    let summary = output.summary;
    writeln!(
        out,
        "deltas    {} lines, {} accepted, {} rejected, {} forwarded",
        summary.lines, summary.accepted, summary.rejected, summary.forwarded
    )?;

    for diagnostic in &summary.diagnostics {
        writeln!(out, "  ! {}", serde_json::to_string(diagnostic)?)?;
    }
    for delta in &output.auxiliary {
        writeln!(out, "  > {}", serde_json::to_string(delta)?)?;
    }

    if verbose && let Some(state) = output.artifact {
        writeln!(out)?;
        writeln!(out, "{}", state.content)?;
    }
    Ok(())
}

// ============================================================================
// Config
// ============================================================================

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.config_file.exists() && !cmd.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.config_file.display()
        ));
    }
    write_default_config(&ctx.config_file)?;
    info!("wrote default config to {}", ctx.config_file.display());
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ctx.config)
                        .context("serializing config to JSON")?
                );
            } else {
                print!(
                    "{}",
                    toml::to_string_pretty(&ctx.config).context("serializing config to TOML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.config_file.display());
            Ok(())
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = default_config_header(path);
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn default_config_header(path: &Path) -> String {
    let mut buffer = String::new();
    buffer.push_str("# Configuration for ");
    buffer.push_str(APP_NAME);
    buffer.push('\n');
    buffer.push_str("# File: ");
    buffer.push_str(&path.display().to_string());
    buffer.push('\n');
    buffer.push_str("# Environment overrides: DELTAFOLD__<SECTION>__<KEY>\n");
    buffer.push('\n');
    buffer
}
