pub mod commands;
pub mod options;
pub mod output;

pub use commands::{build_pipeline, execute};
pub use options::*;
pub use output::print_error;
