pub mod dot;
pub mod mermaid;
pub mod run_result;
pub(crate) mod util;
