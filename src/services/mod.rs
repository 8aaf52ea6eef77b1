pub mod generator;
pub mod persist;
pub mod prompt;
pub mod queue;
pub mod reporter;
pub mod runner;
pub mod storage;
pub mod wildcards;
