use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use codesleuth::config::Config;
use codesleuth::output::OutputFormat;
use codesleuth::parser::LanguageRegistry;
use codesleuth::AnalyzeOptions;

#[derive(Parser)]
#[command(
    name = "codesleuth",
    about = "Language-agnostic SAST engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a source tree against a rule set
    Analyze {
        /// Path to the source tree
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Rule source file (or compiled JSON with --compiled)
        #[arg(long, short = 'r')]
        rules: Option<PathBuf>,

        /// Treat the rules file as already-compiled JSON IR
        #[arg(long)]
        compiled: bool,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,

        /// Write output to file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// List registered language adapters
    Languages,

    /// Generate a starter .codesleuth.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Analyze {
            path,
            rules,
            compiled,
            config,
            format,
            output,
        } => cmd_analyze(path, rules, compiled, config, format, output),
        Commands::Languages => cmd_languages(),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn cmd_analyze(
    path: PathBuf,
    rules: Option<PathBuf>,
    compiled: bool,
    config: Option<PathBuf>,
    format_str: String,
    output_path: Option<PathBuf>,
) -> Result<i32, codesleuth::error::SleuthError> {
    let format = OutputFormat::from_str_lenient(&format_str).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", format_str);
        OutputFormat::Console
    });

    let options = AnalyzeOptions {
        config_path: config,
        rules_path: rules,
        precompiled: if compiled { Some(true) } else { None },
        format,
        ..AnalyzeOptions::default()
    };

    let report = codesleuth::analyze(&path, &options)?;
    let rendered = codesleuth::render_report(&report, format)?;

    match output_path {
        Some(out) => std::fs::write(&out, &rendered)?,
        None => print!("{}", rendered),
    }

    Ok(if report.pass { 0 } else { 1 })
}

fn cmd_languages() -> Result<i32, codesleuth::error::SleuthError> {
    for tag in LanguageRegistry::global().registered_tags() {
        println!("{tag}");
    }
    Ok(0)
}

fn cmd_init(force: bool) -> Result<i32, codesleuth::error::SleuthError> {
    let path = PathBuf::from(".codesleuth.toml");
    if path.exists() && !force {
        eprintln!("{} already exists (use --force to overwrite)", path.display());
        return Ok(1);
    }
    std::fs::write(&path, Config::starter_toml())?;
    println!("Wrote {}", path.display());
    Ok(0)
}
