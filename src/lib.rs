pub mod api;
pub mod config;
pub mod dap;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod log;
pub mod memory;
pub mod sources;
pub mod state;
pub mod visualizer;
