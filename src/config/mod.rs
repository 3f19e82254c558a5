pub mod defs;
pub mod run;

pub use run::{RunConfig, Sample};
