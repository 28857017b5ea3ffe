pub mod engine;
pub mod gallery;
pub mod generation;
pub mod queue;
