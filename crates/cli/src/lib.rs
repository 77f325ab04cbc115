use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use keyusage_core::{AnalysisInput, Analyzer, AnalyzerConfig, PathModel, ResultSet};
use render::OutputFormat;
use std::fs;
use std::io;
use std::path::PathBuf;

mod input;
mod render;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

fn write_output(text: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("Failed to write output {}", path.display())),
        None => print_stdout(text),
    }
}

#[derive(Parser)]
#[command(name = "keyusage")]
#[command(about = "Find which keys of a JSON document a web page's scripts read", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the key paths read by scripts, inline scripts and templates
    Analyze(AnalyzeArgs),

    /// List the key paths of a JSON document
    Paths(PathsArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    /// JSON document whose keys are checked
    #[arg(long)]
    json: PathBuf,

    /// Directory of downloaded script files (searched for **/*.js)
    #[arg(long)]
    scripts: Option<PathBuf>,

    /// V8 precise-coverage snapshot for the scripts and inline scripts
    #[arg(long)]
    coverage: Option<PathBuf>,

    /// Page markup with inline scripts and templates
    #[arg(long)]
    html: Option<PathBuf>,

    /// Paths already resolved by an earlier run (one per line)
    #[arg(long)]
    exclude: Option<PathBuf>,

    /// Analyzer config file (JSON or TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parse scripts containing syntax errors instead of skipping them
    #[arg(long)]
    tolerant: bool,

    /// Match all script files instead of the busiest source folder
    #[arg(long)]
    no_grouping: bool,

    /// Leading path components that define a source folder
    #[arg(long)]
    group_depth: Option<usize>,

    /// Skip the {{ key }} template scan
    #[arg(long)]
    no_templates: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Write the result to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct PathsArgs {
    /// JSON document to flatten
    #[arg(long)]
    json: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

pub fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Analyze(args) => run_analyze(args),
        Commands::Paths(args) => run_paths(args),
    }
}

fn resolve_config(args: &AnalyzeArgs) -> Result<AnalyzerConfig> {
    let mut config = match &args.config {
        Some(path) => input::load_config(path)?,
        None if args.coverage.is_some() => AnalyzerConfig::for_coverage(),
        None => AnalyzerConfig::for_full_source(),
    };

    if args.tolerant {
        config.tolerate_syntax_errors = true;
    }
    if args.no_grouping {
        config.group_by_source_folder = false;
    }
    if let Some(depth) = args.group_depth {
        config.source_group_depth = depth;
    }
    if args.no_templates {
        config.template_fallback = false;
    }
    Ok(config)
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let analyzer = Analyzer::new(config).context("Invalid analyzer configuration")?;

    let document = input::load_document(&args.json)?;
    let mut scripts = match &args.scripts {
        Some(dir) => input::discover_scripts(dir)?,
        None => Vec::new(),
    };
    let markup = args.html.as_deref().map(input::load_markup).transpose()?;
    let mut inline_scripts = markup
        .as_deref()
        .map(keyusage_core::markup::inline_units)
        .unwrap_or_default();
    if let Some(path) = &args.coverage {
        let coverage = input::load_coverage(path)?;
        let files = input::attach_coverage(&mut scripts, &coverage);
        let inline = coverage.attach_inline(&mut inline_scripts);
        log::info!("Attached coverage to {inline} inline scripts");
        if files + inline == 0 {
            log::warn!("No coverage entry matched a script file or inline script");
        }
    }
    let excluded = match &args.exclude {
        Some(path) => input::load_exclusions(path)?,
        None => ResultSet::new(),
    };

    let analysis = AnalysisInput {
        document,
        scripts,
        markup,
        inline_scripts,
        excluded,
    };
    let report = analyzer.analyze(&analysis).context("Analysis failed")?;

    let text = render::render_report(&report, args.format)?;
    write_output(&text, args.output.as_ref())
}

fn run_paths(args: PathsArgs) -> Result<()> {
    let document = input::load_document(&args.json)?;
    let model = PathModel::build(&document);
    let text = render::render_paths(&model, args.format)?;
    print_stdout(&text)
}
