use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use templ_transpiler::batch::{self, BatchOptions, BatchReport, FileOutcome};
use templ_transpiler::lsp::{self, NoMansLandPolicy, ProcessLauncher, ProxyConfig};
use templ_transpiler::watch::{self, WatchConfig};
use templ_transpiler::{VERSION, format};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "templ")]
#[command(about = "templ - HTML templates compiled to Go", version = VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate Go code from .templ files
    Generate {
        /// Generate a single file
        #[arg(short = 'f', long = "file", conflicts_with = "path")]
        file: Option<PathBuf>,

        /// Directory to search for .templ files
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Number of worker threads
        #[arg(short = 'w', long = "workers", default_value_t = batch::default_workers())]
        workers: usize,

        /// Keep regenerating as files change
        #[arg(long)]
        watch: bool,

        /// Shell command to run after files were generated
        #[arg(long)]
        cmd: Option<String>,

        /// Write an HTML page per file showing the source map
        #[arg(long)]
        source_map_visualisations: bool,

        /// Write a JSON source map next to each generated file
        #[arg(long)]
        source_map: bool,

        /// Include the templ version in generated code
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        include_version: bool,

        /// Include a generation timestamp in generated code
        #[arg(long)]
        include_timestamp: bool,
    },

    /// Normalize whitespace in .templ files (stdin to stdout without paths)
    Fmt {
        paths: Vec<PathBuf>,

        /// Print formatted output instead of rewriting files
        #[arg(long)]
        stdout: bool,
    },

    /// Run the language server proxy on stdio
    Lsp {
        /// Log file; logging is discarded without one
        #[arg(long)]
        log: Option<PathBuf>,

        /// Go language server command
        #[arg(long, default_value = "gopls")]
        server: String,

        /// Extra argument for the Go language server (repeatable)
        #[arg(long = "server-arg")]
        server_args: Vec<String>,

        /// Log file for the Go language server
        #[arg(long)]
        server_log: Option<PathBuf>,

        /// Enable RPC tracing in the Go language server log
        #[arg(long)]
        server_rpc_trace: bool,

        /// Delay between an edit and regeneration
        #[arg(long, default_value_t = 50)]
        debounce_ms: u64,

        /// What to do with Go diagnostics that have no template position
        #[arg(long, value_enum, default_value_t = NoMansLandPolicy::default())]
        no_mans_land: NoMansLandPolicy,
    },

    /// Print the version
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Generate {
            file,
            path,
            workers,
            watch,
            cmd,
            source_map_visualisations,
            source_map,
            include_version,
            include_timestamp,
        } => {
            init_logging(io::stderr, "warn");
            let options = BatchOptions {
                workers,
                source_map,
                visualisations: source_map_visualisations,
                include_version,
                include_timestamp,
            };
            if watch {
                generate_watch(&path, &options, cmd.as_deref())
            } else {
                generate(file.as_deref().unwrap_or(&path), &options, cmd.as_deref())
            }
        }
        Commands::Fmt { paths, stdout } => {
            init_logging(io::stderr, "warn");
            fmt(&paths, stdout)
        }
        Commands::Lsp {
            log,
            server,
            server_args,
            server_log,
            server_rpc_trace,
            debounce_ms,
            no_mans_land,
        } => {
            match log {
                Some(log) => {
                    let file = fs::File::create(&log).with_context(|| format!("failed to open {}", log.display()))?;
                    init_logging(Mutex::new(file), "info");
                }
                None => init_logging(io::sink, "info"),
            }
            let config = ProxyConfig {
                server_command: server,
                server_args,
                server_log,
                server_rpc_trace,
                debounce: Duration::from_millis(debounce_ms),
                no_mans_land,
                ..ProxyConfig::default()
            };
            serve(config)
        }
        Commands::Version => {
            println!("v{}", VERSION);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// `RUST_LOG` overrides `default`.
fn init_logging<W>(writer: W, default: &str)
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
}

fn generate(path: &Path, options: &BatchOptions, cmd: Option<&str>) -> Result<ExitCode> {
    let start = Instant::now();
    let files = batch::find_templates(path)?;
    if files.is_empty() {
        bail!("no .templ files found in {}", path.display());
    }

    let report = batch::run(&files, options)?;
    print_report(&report);
    print_summary(report.files(), start.elapsed());

    if report.written() > 0 {
        if let Some(cmd) = cmd {
            run_command(cmd)?;
        }
    }

    if report.error_count() > 0 || !report.failures.is_empty() {
        eprintln!(
            "\n{} {} in generated files",
            report.error_count() + report.failures.len(),
            if report.error_count() + report.failures.len() == 1 { "error" } else { "errors" }
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn generate_watch(root: &Path, options: &BatchOptions, cmd: Option<&str>) -> Result<ExitCode> {
    // A full pass first, then incremental regeneration
    generate(root, options, cmd)?;

    let config = WatchConfig::default();
    watch::watch(root, options, &config, |outcome| match outcome {
        Ok(outcome) => {
            print_outcome(&outcome);
            if outcome.written {
                if let Some(cmd) = cmd {
                    if let Err(err) = run_command(cmd) {
                        eprintln!("Error: {:#}", err);
                    }
                }
            }
        }
        Err(err) => eprintln!("Error: {}", err),
    })?;
    Ok(ExitCode::SUCCESS)
}

fn run_command(cmd: &str) -> Result<()> {
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .status()
        .with_context(|| format!("failed to run `{}`", cmd))?;
    if !status.success() {
        bail!("`{}` exited with {}", cmd, status);
    }
    Ok(())
}

fn fmt(paths: &[PathBuf], to_stdout: bool) -> Result<ExitCode> {
    if paths.is_empty() {
        let mut source = String::new();
        io::stdin().read_to_string(&mut source).context("failed to read stdin")?;
        io::stdout().write_all(format::format(&source).as_bytes())?;
        return Ok(ExitCode::SUCCESS);
    }

    let start = Instant::now();
    let mut count = 0;
    for root in paths {
        for file in batch::find_templates(root)? {
            let source = fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let formatted = format::format(&source);
            if to_stdout {
                print!("{}", formatted);
            } else if formatted != source {
                fs::write(&file, &formatted).with_context(|| format!("failed to write {}", file.display()))?;
                print_done(&file.display().to_string());
                count += 1;
            }
        }
    }
    if !to_stdout {
        print_total("Formatted", count, start.elapsed());
    }
    Ok(ExitCode::SUCCESS)
}

fn serve(config: ProxyConfig) -> Result<ExitCode> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async {
        let launcher = Arc::new(ProcessLauncher::from_config(&config));
        lsp::run(config, launcher, tokio::io::stdin(), tokio::io::stdout()).await
    })?;
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &BatchReport) {
    for outcome in &report.outcomes {
        print_outcome(outcome);
    }
    for failure in &report.failures {
        eprintln!("  {}", failure);
    }
}

fn print_outcome(outcome: &FileOutcome) {
    if outcome.written {
        print_done(&outcome.output.display().to_string());
    }
    if io::stderr().is_terminal() {
        for rendered in outcome.rendered_errors(true) {
            eprint!("{}", rendered);
        }
    } else {
        for line in outcome.error_lines() {
            eprintln!("{}", line);
        }
    }
}

fn print_done(path: &str) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("  \x1b[32m✓\x1b[0m {}", path);
    } else {
        eprintln!("  ✓ {}", path);
    }
}

fn print_summary(count: usize, elapsed: Duration) {
    print_total("Generated", count, elapsed);
}

fn print_total(verb: &str, count: usize, elapsed: Duration) {
    let is_tty = io::stderr().is_terminal();
    let time_str = format_duration(elapsed);
    let files_word = if count == 1 { "file" } else { "files" };

    if is_tty {
        eprintln!("\n\x1b[1m✨ {} {} {} in {}\x1b[0m", verb, count, files_word, time_str);
    } else {
        eprintln!("\n✨ {} {} {} in {}", verb, count, files_word, time_str);
    }
}

fn format_duration(d: Duration) -> String {
    let micros = d.as_micros();
    if micros < 1000 {
        format!("{}μs", micros)
    } else if micros < 1_000_000 {
        format!("{:.1}ms", micros as f64 / 1000.0)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}
