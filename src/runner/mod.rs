pub mod action;
pub mod assertion;
pub mod context;
pub mod dialog;
pub mod display;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod selector;
