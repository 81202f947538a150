//! Style audit and scenario test harness for single-file C submissions

pub mod analysis;
pub mod compile;
pub mod config;
pub mod error;
pub mod functions;
pub mod matcher;
pub mod metrics;
pub mod penalties;
pub mod process;
pub mod report;
pub mod runner;
pub mod source;
pub mod tokens;

pub use analysis::{analyze_bytes, analyze_file, analyze_source, Analysis};
pub use compile::Submission;
pub use config::Config;
pub use error::{Diagnostic, DiagnosticKind, IrisError, Result};
pub use report::Report;
pub use runner::{run_test_phase, Outcome, TestResult, TestRun};
