//! Command-line entry point.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pageshield::dom::html::{parse_html, to_html};
use pageshield::safety::{EntityRedactor, Finding, Sanitizer};
use pageshield::scan::{AnalysisService, LocalAnalysis};
use pageshield::{GuardConfig, PageContext, ScanOutcome};

#[derive(Parser, Debug)]
#[command(name = "pageshield", version, about = "Neutralize prompt injection in page content")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan an HTML file and write the sanitized markup
    Scan {
        /// Input file, or `-` for stdin
        file: PathBuf,
        /// Where to write the sanitized HTML (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// URL recorded in the scan report
        #[arg(long)]
        url: Option<String>,
        /// Print the scan outcome as JSON on stdout
        #[arg(long)]
        json: bool,
        /// Skip embedding-based analysis
        #[arg(long)]
        no_semantic: bool,
    },

    /// Analyse plain text and print it with threats blocked
    Text {
        /// Input file, or `-` for stdin
        file: PathBuf,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        no_semantic: bool,
    },

    /// Mask email addresses and URLs
    Redact {
        /// Input file, or `-` for stdin
        file: PathBuf,
        /// Sender address to leave visible (repeatable)
        #[arg(long = "safe")]
        safe: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut config = GuardConfig::from_env().context("Invalid configuration")?;

    match cli.command {
        Command::Scan {
            file,
            output,
            url,
            json,
            no_semantic,
        } => {
            if no_semantic {
                config.scan.semantic = false;
            }
            scan_command(&config, &file, output.as_deref(), url, json).await
        }
        Command::Text {
            file,
            json,
            no_semantic,
        } => {
            if no_semantic {
                config.scan.semantic = false;
            }
            text_command(&config, &file, json).await
        }
        Command::Redact { file, safe } => {
            let mut safe_list = config.scan.safe_senders.clone();
            safe_list.extend(safe);
            let text = read_input(&file)?;
            println!("{}", EntityRedactor::new().redact(&text, &safe_list));
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays clean for command output.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pageshield=info"));
    let json = std::env::var("PAGESHIELD_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn scan_command(
    config: &GuardConfig,
    file: &Path,
    output: Option<&Path>,
    url: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let markup = read_input(file)?;
    let mut doc = parse_html(&markup)?;
    let session = config.build_session()?;
    let page = PageContext::from_document(&doc, url);

    let outcome = session.scan_document(&mut doc, &page).await;
    let html = to_html(&doc);

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        if let Some(path) = output {
            write_output(Some(path), &html)?;
        }
    } else {
        write_output(output, &html)?;
        eprintln!("{}", summary_line(&outcome));
    }
    Ok(())
}

#[derive(Serialize)]
struct TextReport {
    findings: Vec<Finding>,
    sanitized: String,
}

async fn text_command(config: &GuardConfig, file: &Path, json: bool) -> anyhow::Result<()> {
    let text = read_input(file)?;
    let mut findings = config.pattern_detector().scan(&text);

    if config.scan.semantic {
        let analysis =
            LocalAnalysis::from_provider(config.embedding_provider()?, config.semantic.clone());
        match tokio::time::timeout(config.scan.analysis_timeout, analysis.analyze(&text)).await {
            Ok(Ok(semantic)) => findings.extend(semantic),
            Ok(Err(e)) => tracing::warn!("Semantic analysis failed: {}", e),
            Err(_) => tracing::warn!("Semantic analysis timed out"),
        }
    }

    let sanitized = Sanitizer::new().sanitize_text(&text, &findings, &config.scan.safe_senders);
    if json {
        let report = TextReport {
            findings,
            sanitized,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", sanitized);
        for finding in &findings {
            eprintln!("{}: {} ({:.2})", finding.kind(), finding.subtype(), finding.score());
        }
    }
    Ok(())
}

fn summary_line(outcome: &ScanOutcome) -> String {
    if outcome.is_clean() {
        return "No threats found".to_string();
    }
    let subtypes: Vec<&str> = outcome
        .findings
        .iter()
        .map(|d| d.finding.subtype())
        .collect();
    format!(
        "{} threats, {} neutralized: {}",
        outcome.findings.len(),
        outcome.sanitized_count,
        subtypes.join(", ")
    )
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write_output(path: Option<&Path>, contents: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(contents.as_bytes())?;
            stdout.write_all(b"\n")?;
            Ok(())
        }
    }
}
