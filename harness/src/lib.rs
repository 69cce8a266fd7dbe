pub mod console;
pub mod coverage;
pub mod execute;
pub mod matrix;
pub mod record;
pub mod suite;
pub mod summary;

pub use coverage::{
    clean, parse_summary, CoverageError, CoverageOptions, CoveragePipeline, CoverageResult,
    CoverageRun, ReportStatus,
};
pub use execute::run_artifact;
pub use matrix::BuildMatrix;
pub use record::{RecordBody, RecordError, RecordResult, RunRecord};
pub use suite::{probe_compiler, run_suite, SuiteError, SuiteResult};
pub use summary::Summary;
