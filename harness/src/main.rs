use clap::{Parser, Subcommand};
use harness::{console, CoverageOptions, CoveragePipeline, RecordBody, RunRecord, Summary};
use pipeline::{Manifest, PipelineConfig, SystemRunner};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use toolchain::Resolver;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Build and run the native unit tests, and enforce the coverage gate")]
struct Cli {
    /// Working-tree root the pipelines operate in
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Pipeline configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Also write a JSON result record to this path
    #[arg(long, global = true, value_name = "PATH")]
    json: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run the unit test matrix
    Test {
        /// Only run targets whose name contains this (case-insensitive)
        filter: Option<String>,
        /// Same as the positional filter
        #[arg(long, value_name = "NAME", conflicts_with = "filter")]
        only: Option<String>,
        /// Replace the built-in manifest with a TOML file of [[target]] tables
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Measure coverage and check it against the minimums
    Coverage {
        /// Also generate the HTML report
        #[arg(long)]
        report: bool,
        /// Delete intermediate coverage files and exit
        #[arg(long)]
        clean: bool,
        /// Do not run the test suite first
        #[arg(long = "no-tests", visible_alias = "skip-tests")]
        no_tests: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<u8, Box<dyn std::error::Error>> {
    let json = cli.json.as_deref();

    // Clean mode always succeeds, even with an unusable config file.
    if let Commands::Coverage { clean: true, .. } = cli.command {
        let config = load_config(&cli).unwrap_or_else(|e| {
            warn!("Cleaning with default paths: {}", e);
            PipelineConfig::default().with_root(cli.root.clone())
        });
        return Ok(run_clean(&config, json));
    }

    let config = load_config(&cli)?;
    match cli.command {
        Commands::Test {
            filter,
            only,
            manifest,
        } => {
            let manifest = match manifest {
                Some(path) => Manifest::from_file(&path)?,
                None => Manifest::builtin(),
            };
            run_tests(&config, &manifest, only.or(filter), json).await
        }
        Commands::Coverage { report, no_tests, .. } => {
            let options = CoverageOptions {
                run_tests: !no_tests,
                html_report: report,
            };
            Ok(run_coverage(&config, options, json).await)
        }
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    config.root = std::path::absolute(&cli.root)?;
    config.validate()?;
    Ok(config)
}

async fn run_tests(
    config: &PipelineConfig,
    manifest: &Manifest,
    filter: Option<String>,
    json: Option<&Path>,
) -> Result<u8, Box<dyn std::error::Error>> {
    println!("{}", console::rule());
    println!("Native Unit Test Runner");
    println!("{}", console::rule());
    if let Some(filter) = &filter {
        info!("Filtering targets by '{}'", filter);
    }

    let resolver = Resolver::standard(&config.toolchain);
    let outcome = harness::run_suite(
        config,
        manifest,
        filter.as_deref(),
        &SystemRunner,
        &resolver,
    )
    .await;

    let (exit_code, body) = match outcome {
        Ok(summary) => {
            summary.print();
            (summary.exit_code(), test_body(filter, summary, None))
        }
        Err(e) => {
            error!("Test run aborted: {}", e);
            println!("\n[X] Test run aborted: {}", e);
            (1, test_body(filter, Summary::new(), Some(e.to_string())))
        }
    };

    write_record(json, RunRecord::new(exit_code, body));
    Ok(exit_code)
}

fn test_body(filter: Option<String>, summary: Summary, error: Option<String>) -> RecordBody {
    RecordBody::Test {
        filter,
        passed_count: summary.passed_count(),
        total_count: summary.total_count(),
        results: summary.into_results(),
        error,
    }
}

async fn run_coverage(
    config: &PipelineConfig,
    options: CoverageOptions,
    json: Option<&Path>,
) -> u8 {
    let pipeline = CoveragePipeline::new(config, &SystemRunner);

    let (exit_code, body) = match pipeline.run(options).await {
        Ok(run) => (
            run.exit_code(),
            RecordBody::Coverage {
                summary: Some(run.summary),
                verdict: Some(run.verdict),
                report: Some(run.report),
                error: None,
            },
        ),
        Err(e) => {
            error!("Coverage run aborted: {}", e);
            println!("\n[X] {}", e);
            (
                1,
                RecordBody::Coverage {
                    summary: None,
                    verdict: None,
                    report: None,
                    error: Some(e.to_string()),
                },
            )
        }
    };

    write_record(json, RunRecord::new(exit_code, body));
    exit_code
}

fn run_clean(config: &PipelineConfig, json: Option<&Path>) -> u8 {
    println!("Cleaning temporary coverage files...");
    let removed = harness::clean(config);
    write_record(json, RunRecord::new(0, RecordBody::Clean { removed }));
    0
}

/// The record is an extra; failing to write it never changes the verdict
fn write_record(path: Option<&Path>, record: RunRecord) {
    if let Some(path) = path {
        match record.write_to(path) {
            Ok(()) => info!("Wrote result record to {}", path.display()),
            Err(e) => warn!("Could not write result record to {}: {}", path.display(), e),
        }
    }
}
