pub mod config;
pub mod context;
pub mod episode;
pub mod graph;
pub mod memory;
