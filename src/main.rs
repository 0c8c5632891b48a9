use anyhow::{Context, Result};
use clap::Parser;
use loadmeter::cli::{Cli, Command, GraphArgs, SaveFormat, ScanArgs};
use loadmeter::config::ScanConfig;
use loadmeter::csv_output::CsvOutput;
use loadmeter::session::Session;
use loadmeter::{dot_output, json_output, merge};
use std::fs;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; warnings always, everything with --debug
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Write `content` to a path, or stdout for "-"
fn write_output(target: Option<&str>, content: &str) -> Result<()> {
    match target {
        None | Some("-") => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            stdout.flush()?;
        }
        Some(path) => {
            fs::write(path, content).with_context(|| format!("Failed to write {}", path))?;
        }
    }
    Ok(())
}

fn run_scan(args: ScanArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ScanConfig::from_toml(path)?,
        None => ScanConfig::default(),
    };
    args.apply_to(&mut config);

    let session = Session::new(&config, &args.root)?;
    let roots = match args.unit_list() {
        Some(units) => units,
        None => session.all_roots()?,
    };
    if roots.is_empty() {
        anyhow::bail!("No units found under {}", args.root.display());
    }

    let outcome = session
        .scan(&roots)
        .context("Instrumentation aborted: attribution stack is inconsistent")?;
    tracing::info!(
        loaded = outcome.loaded.len(),
        failed = outcome.failed.len(),
        skipped = outcome.skipped.len(),
        "scan finished"
    );

    println!("{}", "*".repeat(79));
    print!("{}", session.reporter().render_report(config.top));

    if let Some(target) = args.save_to.as_deref() {
        let content = match args.format {
            SaveFormat::Json => json_output::to_json(&session.persisted_records())? + "\n",
            SaveFormat::Csv => {
                let reporter = session.reporter();
                CsvOutput::from_records(reporter.sorted_records()).to_csv()
            }
        };
        if target == "-" {
            println!("{}", "*".repeat(79));
        }
        write_output(Some(target), &content)?;
    }

    Ok(())
}

fn run_graph(args: GraphArgs) -> Result<()> {
    let records = merge::merge_file(&args.input)?;

    if let Some(path) = &args.merged {
        let mut file = fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        json_output::write_records(&mut file, &records)?;
    }

    write_output(args.output.as_deref(), &dot_output::render_dot(&records))
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    match args.command {
        Command::Scan(scan) => run_scan(scan),
        Command::Graph(graph) => run_graph(graph),
    }
}
