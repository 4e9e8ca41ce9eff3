pub mod types;
pub mod error;
pub mod keys;
pub mod clock;
pub mod color;
pub mod config;
pub mod platform;
pub mod engine;
pub mod monitor;
pub mod caster;
pub mod controller;
pub mod orchestrator;
pub mod settings;
pub mod logger;

#[cfg(feature = "debug-capture")]
pub mod debug;
