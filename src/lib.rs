// Public API - the runner and the error type it returns
pub mod error;
pub mod runner;

// Internal modules - organized by stage
mod config;
mod db;
mod formats;
mod io;
mod telemetry;
