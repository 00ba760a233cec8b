pub mod app;
pub mod cli;
pub mod config;
pub mod context;
pub mod detector;
pub mod discovery;
pub mod flow;
pub mod frontier;
pub mod output;
pub mod runner;
pub mod transport;
pub mod utils;

pub use detector::{Finding, Severity};
pub use runner::{Options, ScanError, ScanHooks, ScanPhase, ScanReport, Scanner};

#[cfg(test)]
mod tests;
