use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use simstring::index::{IndexStats, build_from_reader, strip_line_ending};
use simstring::utils::{AppConfig, BuildProgress, config_path};
use simstring::{CharWidth, IndexConfig, IndexReader, Measure};
use std::io::{self, BufRead, BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simstring", version)]
#[command(about = "Approximate string retrieval over a persistent n-gram index")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Do not print the banner
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a database from strings read from stdin, one per line
    Build {
        #[command(flatten)]
        db: DatabaseArgs,

        /// N-gram length
        #[arg(short = 'n', long)]
        ngram: Option<usize>,

        /// Cap on how often one gram is counted per string
        #[arg(long)]
        cap: Option<u32>,
    },
    /// Retrieve similar strings for each query line read from stdin
    Query {
        #[command(flatten)]
        db: DatabaseArgs,

        /// Similarity measure: exact, dice, cosine, jaccard or overlap
        #[arg(short = 's', long)]
        measure: Option<Measure>,

        /// Similarity threshold in [0, 1]
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Show database statistics
    Stats {
        #[command(flatten)]
        db: DatabaseArgs,
    },
    /// Show the effective defaults and where they are read from
    Config {
        /// Write the effective defaults to the config file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args)]
struct DatabaseArgs {
    /// Database directory
    #[arg(short, long = "database")]
    database: PathBuf,

    /// Character type: narrow (bytes) or wide (Unicode scalars)
    #[arg(short = 'c', long = "char")]
    char_width: Option<CharWidth>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let app = AppConfig::load().context("Failed to load config")?;

    if !cli.quiet {
        println!("simstring {}", env!("CARGO_PKG_VERSION"));
        println!();
    }

    match cli.command {
        Commands::Build { db, ngram, cap } => {
            let config = IndexConfig::new(
                ngram.unwrap_or(app.ngram_length),
                db.char_width.unwrap_or(app.char_width),
            )
            .with_max_multiplicity(cap);
            build(&db.database, config, app.progress && io::stderr().is_terminal())
        }
        Commands::Query {
            db,
            measure,
            threshold,
        } => query(
            &db,
            measure.unwrap_or(app.measure),
            threshold.unwrap_or(app.threshold),
        ),
        Commands::Stats { db } => {
            let reader = open(&db)?;
            println!("{}", IndexStats::collect(&reader));
            Ok(())
        }
        Commands::Config { init } => config(&app, init),
    }
}

fn config(app: &AppConfig, init: bool) -> Result<()> {
    let path = config_path().context("Could not determine config directory")?;
    if init {
        app.save_to(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    } else {
        println!("Config file: {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(app)?);
    Ok(())
}

fn build(path: &Path, config: IndexConfig, spinner: bool) -> Result<()> {
    println!("Constructing the database");
    println!("Database name: {}", path.display());
    println!("N-gram length: {}", config.ngram_length);
    io::stdout().flush()?;

    let mut progress = BuildProgress::new(spinner);
    let stdin = io::stdin();
    let summary = build_from_reader(path, config, stdin.lock(), |n| progress.update(n))
        .with_context(|| format!("Failed to build {}", path.display()))?;
    progress.finish();

    println!("Flushing the database");
    println!();
    println!("Seconds required: {:.3}", summary.elapsed.as_secs_f64());
    Ok(())
}

fn query(db: &DatabaseArgs, measure: Measure, threshold: f64) -> Result<()> {
    measure.check_threshold(threshold)?;
    let reader = open(db)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut input = io::stdin().lock();
    let mut line = Vec::new();
    loop {
        line.clear();
        if input.read_until(b'\n', &mut line).context("Failed to read query")? == 0 {
            break;
        }
        let started = Instant::now();

        let mut retrieved = 0usize;
        for m in reader.retrieve_bytes(strip_line_ending(&line), measure, threshold)? {
            out.write_all(b"\t")?;
            out.write_all(m.bytes)?;
            out.write_all(b"\n")?;
            retrieved += 1;
        }
        out.flush()?;

        eprintln!(
            "{} strings retrieved ({:.6} sec)",
            retrieved,
            started.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

fn open(db: &DatabaseArgs) -> Result<IndexReader> {
    let reader = match db.char_width {
        Some(width) => IndexReader::open_with_width(&db.database, width),
        None => IndexReader::open(&db.database),
    };
    reader.with_context(|| format!("Failed to open {}", db.database.display()))
}

fn report_error(e: &anyhow::Error) {
    let choice = if io::stderr().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stderr = StandardStream::stderr(choice);
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    let _ = write!(stderr, "ERROR:");
    let _ = stderr.reset();
    let _ = writeln!(stderr, " {e:#}");
}
