pub mod collab;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod progress;

pub use error::{Result, TrainError};
