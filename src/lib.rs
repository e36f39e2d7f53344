pub mod cassettes;
pub mod config;
pub mod errors;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod process;
pub mod report;
pub mod source;
pub mod store;
