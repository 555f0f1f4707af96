pub mod cli;
pub mod config;
pub mod definition;
pub mod emit;
pub mod graph;
pub mod loader;
pub mod page;
pub mod runner;
pub mod screenshot;
