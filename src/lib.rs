pub mod classifier;
pub mod config;
pub mod decoder;
pub mod error;
pub mod gradebook;
pub mod grader;
pub mod runner;
pub mod scorer;
pub mod splice;
pub mod validator;

pub use error::{GradeError, Result};
