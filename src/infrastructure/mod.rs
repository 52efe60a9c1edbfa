pub mod logging;
pub mod metrics;
pub mod parallel;

pub use logging::{init_dev_logging, init_logging, init_prod_logging, LogConfig, LogFormat, LogOutput};
pub use metrics::{CompileMetrics, MetricsSummary, Timer, TimingStats};
pub use parallel::{ClassOutcome, ModuleCompiler, ModuleReport, ReportSummary};
