pub mod config;
pub mod dataset;
pub mod errors;
pub mod grading;
pub mod model;
pub mod parser;
pub mod performance;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod schema;
pub mod storage;

pub use errors::{AssessError, AssessResult};
pub use pipeline::AssessmentContext;
