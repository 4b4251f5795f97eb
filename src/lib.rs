// Library module for tempsweep
// Re-exports modules for use in integration tests and the CLI

pub mod cleaner;
pub mod native;
