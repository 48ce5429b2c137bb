mod api;
mod chart;
mod injection;
mod pipeline;
mod report;
mod schedule;
mod session;

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Weekday;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{ApiServer, ApiServerConfig, DEFAULT_API_PORT};
use crate::chart::render::{Layout, write_png};
use crate::injection::gates::{compute_gate_table, load_gate_input, write_gate_csv};
use crate::pipeline::{ChartRequest, render_chart};
use crate::schedule::expander::DayOrder;
use crate::schedule::table::{export_csv, import_csv};
use crate::session::{Session, load_session, save_session};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliLayout {
    Grid,
    Weekly,
    Daily,
    Dual,
}

impl From<CliLayout> for Layout {
    fn from(value: CliLayout) -> Self {
        match value {
            CliLayout::Grid => Layout::Grid,
            CliLayout::Weekly => Layout::Weekly,
            CliLayout::Daily => Layout::Daily,
            CliLayout::Dual => Layout::Dual,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "timetable",
    version,
    about = "Weekly timetable charts and injection gate timing"
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a session file with the built-in sample children
    Init(InitArgs),
    /// Print the expanded intervals and row errors as JSON
    Expand(ChildArgs),
    /// Draw a chart for one child and write it as PNG
    Render(RenderArgs),
    /// Write a child's rows to CSV
    ExportCsv(ExportArgs),
    /// Replace a child's rows from CSV and save the session
    ImportCsv(ImportArgs),
    /// Convert screw positions into gate open/close times
    Gates(GatesArgs),
    /// Print a summary of every child in the session
    Check(SessionArgs),
    /// Serve the session over the local HTTP API
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct SessionArgs {
    #[arg(long, default_value = "schedule.json", value_hint = ValueHint::FilePath)]
    session: PathBuf,
}

#[derive(Args, Debug)]
struct InitArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Overwrite an existing file
    #[arg(long, action = ArgAction::SetTrue)]
    force: bool,
}

#[derive(Args, Debug)]
struct ChildArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Child name; defaults to the first child
    #[arg(long)]
    child: Option<String>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    target: ChildArgs,

    #[arg(long, value_enum, default_value_t = CliLayout::Weekly)]
    layout: CliLayout,

    /// Second child for the dual layout
    #[arg(long = "with")]
    partner: Option<String>,

    /// Day for the daily layout (월..일 or Mon..Sun)
    #[arg(long, value_parser = parse_day)]
    day: Option<Weekday>,

    #[arg(long, default_value = ".", value_hint = ValueHint::DirPath)]
    out_dir: PathBuf,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    target: ChildArgs,

    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ImportArgs {
    #[command(flatten)]
    target: ChildArgs,

    #[arg(short, long, value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct GatesArgs {
    #[arg(short, long, default_value = "gates.json", value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// CSV destination, `-` for stdout
    #[arg(short, long, default_value = "-")]
    output: String,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    session: SessionArgs,

    #[arg(long, default_value = "0.0.0.0")]
    api_bind: String,

    #[arg(long, default_value_t = DEFAULT_API_PORT)]
    api_port: u16,
}

fn parse_day(token: &str) -> Result<Weekday, String> {
    DayOrder::full_week()
        .lookup(token)
        .map(|(day, _)| day)
        .ok_or_else(|| format!("unknown day '{token}', expected 월..일 or Mon..Sun"))
}

fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    if let Err(err) = run(cli.command) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Init(args) => handle_init(args),
        Command::Expand(args) => handle_expand(args),
        Command::Render(args) => handle_render(args),
        Command::ExportCsv(args) => handle_export(args),
        Command::ImportCsv(args) => handle_import(args),
        Command::Gates(args) => handle_gates(args),
        Command::Check(args) => {
            let session = open_session(&args)?;
            report::run_check(&session);
            Ok(())
        }
        Command::Serve(args) => handle_serve(args),
    }
}

fn open_session(args: &SessionArgs) -> Result<Session> {
    load_session(&args.session)
        .with_context(|| format!("failed to load {}", args.session.display()))
}

fn handle_init(args: InitArgs) -> Result<()> {
    let path = &args.session.session;
    if path.exists() && !args.force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    save_session(path, &Session::default())?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn handle_expand(args: ChildArgs) -> Result<()> {
    let session = open_session(&args.session)?;
    let child = session.child_or_first(args.child.as_deref())?;
    let expansion = session.expand_child(child);
    let text = serde_json::to_string_pretty(&expansion)?;
    println!("{text}");
    Ok(())
}

fn handle_render(args: RenderArgs) -> Result<()> {
    let session = open_session(&args.target.session)?;
    let child = session.child_or_first(args.target.child.as_deref())?;
    let request = ChartRequest {
        partner: args.partner.as_deref(),
        day: args.day,
    };
    let chart = render_chart(&session, child, args.layout.into(), request)?;
    for excluded in &chart.errors {
        warn!("excluded {excluded}");
    }

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("unable to create {}", args.out_dir.display()))?;
    let path = args.out_dir.join(&chart.file_name);
    write_png(&path, &chart.png)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn handle_export(args: ExportArgs) -> Result<()> {
    let session = open_session(&args.target.session)?;
    let child = session.child_or_first(args.target.child.as_deref())?;
    export_csv(&args.output, &child.entries)?;
    println!(
        "Exported {} rows for {} to {}",
        child.entries.len(),
        child.name,
        args.output.display()
    );
    Ok(())
}

fn handle_import(args: ImportArgs) -> Result<()> {
    let mut session = open_session(&args.target.session)?;
    let name = session
        .child_or_first(args.target.child.as_deref())?
        .name
        .clone();
    let rows = import_csv(&args.input)?;
    let count = rows.len();
    session.replace_entries(&name, rows)?;
    save_session(&args.target.session.session, &session)?;
    info!("Imported {count} rows for {name}");
    println!("Imported {count} rows for {name}");
    Ok(())
}

fn handle_gates(args: GatesArgs) -> Result<()> {
    let input = load_gate_input(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    let table = compute_gate_table(&input.profile, &input.rows, input.strict_positions)?;
    for error in &table.errors {
        warn!("excluded {error}");
    }
    info!(
        "Total cycle {:.2}s to V/P at {}, {} gates converted",
        table.total_cycle_s,
        input.profile.vp_position(),
        table.timings.len()
    );

    if args.output == "-" {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        write_gate_csv(&table.timings, &mut lock)?;
        lock.flush()?;
    } else {
        let file = fs::File::create(&args.output)
            .with_context(|| format!("unable to create {}", args.output))?;
        write_gate_csv(&table.timings, file)?;
        println!("Wrote {}", args.output);
    }
    Ok(())
}

fn handle_serve(args: ServeArgs) -> Result<()> {
    let session = open_session(&args.session)?;
    let server = ApiServer::start(
        ApiServerConfig {
            bind_addr: args.api_bind.clone(),
            port: args.api_port,
        },
        session,
    )
    .with_context(|| {
        format!(
            "failed to start local API at {}:{}",
            args.api_bind, args.api_port
        )
    })?;
    server.wait();
    Ok(())
}
