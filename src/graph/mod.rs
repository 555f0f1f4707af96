pub mod analysis;
pub mod builder;
