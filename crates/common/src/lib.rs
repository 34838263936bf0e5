//! Common types shared by the DingTalk client crates

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
