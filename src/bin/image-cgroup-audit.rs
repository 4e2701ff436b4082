use anyhow::{Context, Result};
use clap::Parser;
use image_cgroup_audit::preflight;
use image_cgroup_audit::{AnalysisResult, AnalyzerConfig, ImageAnalyzer, ImageReference, RuntimeFamily};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "image-cgroup-audit")]
#[command(about = "Find container images whose Java, Node.js or .NET runtimes are not cgroup v2 aware")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct AuditCli {
    /// Image references to analyze
    images: Vec<String>,

    /// File with one image per line: `reference [image-id]`
    #[arg(short, long)]
    images_file: Option<PathBuf>,

    /// YAML or JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base directory for the working root
    #[arg(short, long)]
    working_dir: Option<PathBuf>,

    /// Registry credentials passed to the engine's --authfile
    #[arg(long)]
    authfile: Option<PathBuf>,

    /// Keep pulled images after analysis
    #[arg(long)]
    keep_images: bool,

    /// Container engine binary
    #[arg(long)]
    engine: Option<String>,

    /// Write JSON results here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip host preflight checks
    #[arg(long)]
    skip_checks: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// One output record: report columns plus the full analysis.
#[derive(Serialize)]
struct ImageRow<'a> {
    image: &'a str,
    image_id: Option<&'a str>,
    java_found: String,
    java_versions: String,
    java_compatible: String,
    node_found: String,
    node_versions: String,
    node_compatible: String,
    dotnet_found: String,
    dotnet_versions: String,
    dotnet_compatible: String,
    error: Option<&'a str>,
    analysis: &'a AnalysisResult,
}

impl<'a> ImageRow<'a> {
    fn new(result: &'a AnalysisResult) -> Self {
        let java = result.report(RuntimeFamily::Java);
        let node = result.report(RuntimeFamily::Node);
        let dotnet = result.report(RuntimeFamily::DotNet);
        Self {
            image: result.image_name(),
            image_id: result.image_id(),
            java_found: java.found(),
            java_versions: java.versions(),
            java_compatible: java.compatible().to_string(),
            node_found: node.found(),
            node_versions: node.versions(),
            node_compatible: node.compatible().to_string(),
            dotnet_found: dotnet.found(),
            dotnet_versions: dotnet.versions(),
            dotnet_compatible: dotnet.compatible().to_string(),
            error: result.error(),
            analysis: result,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AuditCli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // Results go to stdout, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting image-cgroup-audit v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let images = collect_images(&cli)?;
    if images.is_empty() {
        anyhow::bail!("No images to analyze. Pass image references or --images-file.");
    }

    if cli.skip_checks {
        warn!("Skipping preflight checks");
    } else {
        run_checks(&config, cli.verbose).await?;
    }

    let mut analyzer = ImageAnalyzer::from_config(&config)
        .with_context(|| format!("Failed to prepare working root in {}", config.working_dir.display()))?;

    let total = images.len();
    let mut results = Vec::with_capacity(total);
    for (index, image) in images.iter().enumerate() {
        info!("[{}/{}] {}", index + 1, total, image);
        results.push(analyzer.analyze(image).await);
    }

    write_results(&results, cli.output.as_deref())?;
    log_summary(&results);

    Ok(())
}

fn load_config(cli: &AuditCli) -> Result<AnalyzerConfig> {
    let mut config = match &cli.config {
        Some(path) => AnalyzerConfig::load(path)?,
        None => AnalyzerConfig::default(),
    };

    if let Some(dir) = &cli.working_dir {
        config.working_dir = dir.clone();
    }
    if let Some(auth) = &cli.authfile {
        config.auth_file = Some(auth.clone());
    }
    if let Some(engine) = &cli.engine {
        config.engine_binary = engine.clone();
    }
    if cli.keep_images {
        config.keep_images = true;
    }

    config.validate()?;
    Ok(config)
}

/// Images from the command line, then the images file, first occurrence kept.
fn collect_images(cli: &AuditCli) -> Result<Vec<ImageReference>> {
    let mut images: Vec<ImageReference> = cli.images.iter().filter_map(|line| ImageReference::from_list_line(line)).collect();

    if let Some(path) = &cli.images_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read images file {}", path.display()))?;
        images.extend(content.lines().filter_map(ImageReference::from_list_line));
    }

    let mut seen = HashSet::new();
    images.retain(|image| seen.insert(image.clone()));
    Ok(images)
}

async fn run_checks(config: &AnalyzerConfig, verbose: bool) -> Result<()> {
    info!("Running system checks");
    preflight::check_engine(&config.engine_binary).await?;
    if verbose {
        preflight::check_engine_functional(&config.engine_binary).await?;
    }
    preflight::check_working_root(&config.working_dir, config.min_free_space_gb)?;
    Ok(())
}

fn write_results(results: &[AnalysisResult], output: Option<&Path>) -> Result<()> {
    let rows: Vec<ImageRow<'_>> = results.iter().map(ImageRow::new).collect();
    let json = serde_json::to_string_pretty(&rows)?;

    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Results written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn log_summary(results: &[AnalysisResult]) {
    let failed = results.iter().filter(|r| r.is_error()).count();
    let incompatible = results
        .iter()
        .filter(|r| {
            RuntimeFamily::ALL
                .iter()
                .any(|&family| r.report(family).all_compatible() == Some(false))
        })
        .count();
    let with_runtimes = results.iter().filter(|r| r.has_binaries()).count();

    info!(
        "Analyzed {} images: {} with runtimes, {} with incompatible runtimes, {} failed",
        results.len(),
        with_runtimes,
        incompatible,
        failed
    );
    for result in results.iter().filter(|r| r.is_error()) {
        error!("{}: {}", result.image_name(), result.error().unwrap_or_default());
    }
}
