//! mdforge – command-line Markdown → PDF converter.
//!
//! Usage:
//!   mdforge <input.md> [output.pdf] [--strategy native-print|raster-slice]
//!           [--config export.json]
//!   mdforge <input.md> --title "My Report" [--strategy ...] [--config ...]
//!   mdforge --request [--config export.json] < request.json > response.bin
//!
//! An output path is written exactly as given. Without one the PDF goes to
//! the current directory, named after `--title` or the document title
//! (e.g. `# Report` → `Report.pdf`).

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;

use md_forge::chrome::ChromeLauncher;
use md_forge::controller::{ExportController, LogNotifier};
use md_forge::native::NativePrint;
use md_forge::service::ExportService;
use md_forge::{build_exporter, ExportConfig, MarkdownDocument, StrategyKind};

#[derive(Debug, Parser)]
#[command(name = "mdforge", version, about = "Markdown to PDF converter")]
struct Cli {
    /// Markdown file to convert
    input: Option<PathBuf>,

    /// Output path, written exactly as given (default: `<title>.pdf` in the
    /// current directory)
    output: Option<PathBuf>,

    /// Export strategy; overrides the config file
    #[arg(long, short, value_enum)]
    strategy: Option<StrategyKind>,

    /// Title used for the file name (default: derived from the first line).
    /// Cannot be combined with an output path.
    #[arg(long, short, conflicts_with = "output")]
    title: Option<String>,

    /// JSON configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Read an export request JSON from stdin and write the response body to
    /// stdout
    #[arg(long, conflicts_with_all = ["input", "output", "strategy", "title"])]
    request: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<ExportConfig> {
    let mut config = match &cli.config {
        Some(path) => ExportConfig::from_json_file(path)?,
        None => ExportConfig::default(),
    };
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    Ok(config)
}

fn serve_request(config: &ExportConfig) -> anyhow::Result<ExitCode> {
    let launcher = ChromeLauncher::new(config.chrome.clone(), config.idle_timeout());
    let service = ExportService::new(
        NativePrint::new(launcher).with_readiness(config.readiness()),
        config.limits,
    );

    let mut body = Vec::new();
    io::stdin().read_to_end(&mut body).context("reading request from stdin")?;
    let response = service.handle_json(&body);

    for (name, value) in &response.headers {
        eprintln!("{name}: {value}");
    }
    io::stdout().write_all(&response.body).context("writing response")?;
    Ok(if response.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn convert(cli: &Cli, config: ExportConfig) -> anyhow::Result<ExitCode> {
    let Some(input) = &cli.input else {
        bail!("no input file specified (see --help)");
    };
    let text = fs::read_to_string(input)
        .with_context(|| format!("reading '{}'", input.display()))?;
    let doc = MarkdownDocument::new(text);

    // An explicit output path is written as given; --title only applies
    // without one.
    let dir = PathBuf::new();
    let controller = ExportController::new(build_exporter(&config), LogNotifier, dir);
    let result = match &cli.output {
        Some(out) => controller.export_to(&doc, out),
        None => controller.export(&doc, cli.title.as_deref()),
    };
    match result {
        Ok(path) => {
            eprintln!("Wrote '{}' ({:?})", path.display(), config.strategy);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Error generating PDF: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if cli.request {
        serve_request(&config)
    } else {
        convert(&cli, config)
    }
}
