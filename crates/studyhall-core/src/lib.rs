pub mod config;
pub mod error;
pub mod types;

pub use config::StudyhallConfig;
pub use error::{CoreError, Result};
pub use types::Attachment;
