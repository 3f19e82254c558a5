pub mod rnaseq;
pub mod tasks;
