//! Error type for the vstbridge umbrella crate.
//!
//! Wraps bridge and IO errors so `?` works across both in applications that
//! also touch the filesystem.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Bridge(#[from] vstbridge_core::BridgeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
