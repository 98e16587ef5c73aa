// src/lib.rs
pub mod config;
pub mod drivers;
pub mod engine;
#[cfg(feature = "gui")]
pub mod gui;
pub mod ingest;
pub mod renderer;
pub mod slots;
pub mod types;
