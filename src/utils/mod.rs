pub mod command;
pub mod file;
pub mod mapping;
pub mod report;
pub mod system;
pub mod task;
