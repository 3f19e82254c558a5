pub mod args;

use clap::Parser;
pub use args::{Arguments, Stage};

pub fn parse() -> Arguments {
    Arguments::parse()
}
