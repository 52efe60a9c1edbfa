use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::exttypes::validators::ValidatorSet;
use crate::frontend::config::{Config, ErrorFormat};
use crate::infrastructure::logging::{init_logging, LogConfig};
use crate::infrastructure::parallel::{ModuleCompiler, ModuleReport, ReportSummary};

/// Compile `@jit` Python classes into native extension types
#[derive(Debug, Parser)]
#[command(name = "typthon-ext")]
#[command(version)]
#[command(about = "Compile @jit Python classes into native extension types", long_about = None)]
pub struct CliArgs {
    /// Files or directories to compile
    #[arg(value_name = "PATHS", required = true)]
    pub paths: Vec<PathBuf>,

    /// Configuration file (default: nearest .typthon-ext.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Compile classes sequentially
    #[arg(long)]
    pub no_parallel: bool,

    /// Print JSON summaries instead of layouts
    #[arg(long)]
    pub json: bool,

    #[arg(long)]
    pub no_color: bool,

    /// Debug-level logging with stage spans
    #[arg(short, long)]
    pub verbose: bool,
}

pub struct Cli {
    args: CliArgs,
    config: Config,
}

impl Cli {
    pub fn new(args: CliArgs, config: Config) -> Self {
        Self { args, config }
    }

    fn color(&self) -> bool {
        self.config.errors.color && !self.args.no_color
    }

    fn json(&self) -> bool {
        self.args.json || self.config.errors.format == ErrorFormat::Json
    }

    /// Every file named on the command line, with directories expanded.
    pub fn collect_files(&self) -> Result<Vec<PathBuf>, String> {
        let mut files = Vec::new();

        for path in &self.args.paths {
            if path.is_file() {
                files.push(path.clone());
            } else if path.is_dir() {
                let pattern = format!("{}/**/*.py", path.display());
                for entry in glob::glob(&pattern).map_err(|e| format!("Glob pattern error: {}", e))? {
                    match entry {
                        Ok(file) if file.is_file() && self.config.should_compile(&file) => files.push(file),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Error accessing path"),
                    }
                }
            } else {
                return Err(format!("Path not found: {}", path.display()));
            }
        }

        Ok(files)
    }

    pub fn run(&self) -> Result<i32, String> {
        let files = self.collect_files()?;
        debug!(files = files.len(), "Collected input files");

        let compiler = ModuleCompiler::new()
            .with_flags(self.config.compile.flags.clone())
            .with_validators(ValidatorSet::from_config(&self.config.validation))
            .with_parallel(self.config.compile.parallel && !self.args.no_parallel);

        let mut reports = Vec::new();
        let mut error_count = 0;

        for file in &files {
            match compiler.compile_file(file) {
                Ok(report) => {
                    error_count += report.errors().count();
                    reports.push(report);
                }
                Err(e) => {
                    error_count += 1;
                    self.print_error(&format!("{}: {}", file.display(), e));
                }
            }
            if error_count >= self.config.errors.max_errors {
                break;
            }
        }

        if self.json() {
            let summaries: Vec<ReportSummary> = reports.iter().map(ReportSummary::from).collect();
            let json = serde_json::to_string_pretty(&summaries).map_err(|e| e.to_string())?;
            println!("{}", json);
        } else {
            for report in &reports {
                self.print_report(report);
            }
            self.print_summary(files.len(), &reports, error_count);
        }

        if self.args.verbose {
            eprintln!("{}", compiler.metrics().summary().report());
        }

        Ok(if error_count == 0 { 0 } else { 1 })
    }

    fn print_report(&self, report: &ModuleReport) {
        for ty in report.compiled() {
            println!("{}", ty.summary());
        }
        for error in report.errors() {
            self.print_error(&format!("{}: {}", report.path.display(), error));
        }
    }

    fn print_summary(&self, file_count: usize, reports: &[ModuleReport], error_count: usize) {
        let compiled: usize = reports.iter().map(|r| r.compiled().count()).sum();
        let message = format!(
            "Compiled {} class{} in {} file{}",
            compiled,
            if compiled == 1 { "" } else { "es" },
            file_count,
            if file_count == 1 { "" } else { "s" }
        );

        if error_count == 0 {
            self.print_success(&message);
        } else {
            eprintln!();
            self.print_error(&format!(
                "{}, {} error{}",
                message,
                error_count,
                if error_count == 1 { "" } else { "s" }
            ));
        }
    }

    fn print_error(&self, msg: &str) {
        if self.color() {
            eprintln!("\x1b[31m{}\x1b[0m", msg);
        } else {
            eprintln!("{}", msg);
        }
    }

    fn print_success(&self, msg: &str) {
        if self.color() {
            println!("\x1b[32m{}\x1b[0m", msg);
        } else {
            println!("{}", msg);
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::discover()),
    }
}

/// Entry point for CLI binary
pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config = load_config(args.config.as_deref())?;

    let log_config = if args.verbose {
        LogConfig::new()
            .with_level_name("debug")
            .with_span_events(true)
            .with_filter("typthon_ext=debug")
    } else {
        LogConfig::new()
            .with_level_name(&config.logging.level)
            .with_format(config.logging.format)
    };
    let guard = init_logging(log_config);

    let cli = Cli::new(args, config);
    let exit_code = cli.run()?;
    drop(guard);
    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let args = CliArgs::try_parse_from(["typthon-ext", "--no-parallel", "--json", "src", "shapes.py"]).unwrap();
        assert!(args.no_parallel);
        assert!(args.json);
        assert!(!args.verbose);
        assert_eq!(args.paths, vec![PathBuf::from("src"), PathBuf::from("shapes.py")]);
    }

    #[test]
    fn test_paths_are_required() {
        assert!(CliArgs::try_parse_from(["typthon-ext"]).is_err());
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let args = CliArgs::try_parse_from(["typthon-ext", "/definitely/not/here.py"]).unwrap();
        let cli = Cli::new(args, Config::default());
        assert!(cli.collect_files().unwrap_err().starts_with("Path not found"));
    }
}
