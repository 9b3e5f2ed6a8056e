//! codesleuth — language-agnostic SAST engine.
//!
//! Builds a program model from a source tree (import maps, typed function
//! and class definitions, per-function control-flow graphs, a call graph)
//! and evaluates compiled JSON rules against it: call/variable pattern
//! matching and intra-/inter-procedural taint analysis with sanitizers.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use codesleuth::{analyze, AnalyzeOptions};
//!
//! let mut options = AnalyzeOptions::default();
//! options.rules_path = Some("rules.json".into());
//! options.precompiled = Some(true);
//! let report = analyze(Path::new("./src"), &options).unwrap();
//! println!("Pass: {}, Detections: {}", report.pass, report.detections.len());
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod ir;
pub mod output;
pub mod parser;
pub mod rules;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use analysis::{ModuleAnalysis, ProgramModel};
use config::Config;
use error::Result;
use ir::{module_fqn_for_path, Language};
use output::OutputFormat;
use parser::LanguageRegistry;
use rules::{Detection, RuleEngine, RuleLoader};

/// Cooperative cancellation, checked at file and rule boundaries. In-flight
/// work finishes its current unit before stopping.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Options for an analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Path to config file (defaults to `.codesleuth.toml` in the scan dir).
    pub config_path: Option<PathBuf>,
    /// Rule source (or compiled JSON) path; no rules means model-only.
    pub rules_path: Option<PathBuf>,
    /// Override for `rules.precompiled` in the config.
    pub precompiled: Option<bool>,
    /// Output format.
    pub format: OutputFormat,
    /// Cancellation token shared with the caller.
    pub cancel: CancelToken,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            rules_path: None,
            precompiled: None,
            format: OutputFormat::Console,
            cancel: CancelToken::new(),
        }
    }
}

/// Complete analysis report.
#[derive(Debug)]
pub struct AnalysisReport {
    pub target_name: String,
    pub detections: Vec<Detection>,
    pub files_analyzed: usize,
    pub rules_loaded: usize,
    pub pass: bool,
}

/// Run a complete analysis: discover files, extract per-file models in
/// parallel, link at the barrier, then execute rules.
pub fn analyze(path: &Path, options: &AnalyzeOptions) -> Result<AnalysisReport> {
    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(|| path.join(".codesleuth.toml"));
    let config = Config::load(&config_path)?;

    let target_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    // Load rules before parsing: a broken rule set aborts the run cheaply.
    let rules = match &options.rules_path {
        Some(rules_path) => {
            let precompiled = options.precompiled.unwrap_or(config.rules.precompiled);
            if precompiled {
                RuleLoader::load_compiled(rules_path)?
            } else {
                RuleLoader::new(&config.rules.compiler)
                    .with_timeout(Duration::from_secs(config.rules.timeout_secs))
                    .compile_and_load(rules_path)?
            }
        }
        None => Vec::new(),
    };
    let engine = RuleEngine::new(rules);
    let rules_loaded = engine.rules().count();

    // Pre-barrier phase: one task per source file.
    let files = discover_files(path, &config);
    let modules: Vec<ModuleAnalysis> = files
        .par_iter()
        .filter_map(|file| {
            if options.cancel.is_cancelled() {
                return None;
            }
            match extract_file(path, file) {
                Ok(analysis) => analysis,
                Err(e) => {
                    // Parse errors stay local to the file.
                    tracing::warn!(file = %file.display(), error = %e, "file skipped");
                    None
                }
            }
        })
        .collect();
    let files_analyzed = modules.len();

    // Barrier: registries become read-only, the call graph links.
    let program = ProgramModel::from_modules(modules);

    let mut detections = engine.run(&program, &options.cancel);
    detections.retain(|d| d.confidence >= config.report.min_confidence);

    let pass = !config.report.fail_on_detection || detections.is_empty();

    Ok(AnalysisReport {
        target_name,
        detections,
        files_analyzed,
        rules_loaded,
        pass,
    })
}

/// Render an analysis report in the specified format.
pub fn render_report(report: &AnalysisReport, format: OutputFormat) -> Result<String> {
    output::render(report, format)
}

/// Enumerate analyzable source files under `root`, honoring gitignore.
fn discover_files(root: &Path, config: &Config) -> Vec<PathBuf> {
    let registry = LanguageRegistry::global();
    let wanted = &config.analysis.languages;

    let mut files: Vec<PathBuf> = ignore::WalkBuilder::new(root)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .filter(|p| {
            let language = Language::from_path(p);
            if language == Language::Unknown {
                return false;
            }
            if !wanted.is_empty() && !wanted.iter().any(|w| w == language.tag()) {
                return false;
            }
            registry.adapter_for(language).is_some()
        })
        .collect();
    files.sort();
    files
}

/// Per-file extraction: returns `Ok(None)` when no adapter claims the file.
fn extract_file(root: &Path, file: &Path) -> Result<Option<ModuleAnalysis>> {
    let registry = LanguageRegistry::global();
    let Some(adapter) = registry.adapter_for_path(file) else {
        return Ok(None);
    };
    let source = std::fs::read_to_string(file)?;
    let relative = file.strip_prefix(root).unwrap_or(file);
    let module_fqn = module_fqn_for_path(relative);
    analysis::analyze_module(adapter.as_ref(), file, &module_fqn, &source).map(Some)
}
