//! Database access and initialization

pub mod init;

pub use init::*;
