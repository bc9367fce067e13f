pub mod config;
pub mod errors;
pub mod types;

pub use config::{EncodeStrategy, EncoderConfig, RecorderConfig};
pub use errors::{ConfigurationError, EncoderError, FailureKind, FramePipeError, ReadbackError};
pub use types::*;
