pub mod error;
pub mod types;
pub mod config;
pub mod platform;

pub use config::{CodecConfig, DEFAULT_MAX_DOCUMENT_SIZE};
pub use error::{CommonError, CommonResult};
pub use platform::Fingerprint;
pub use types::*;
