pub mod error;
pub mod hmm;

pub use error::{Error, Result};
