pub mod client;
pub mod error;
pub mod executor;
pub mod models;
pub mod report;
pub mod utils;

pub use error::{LoadTestError, Result};
pub use executor::{run_load_test, RunOutcome};
pub use models::dsl_model::{DslConfig, ScenarioConfig, Stage};
