//! Database models, bootstrap and record access

pub mod init;
pub mod models;
pub mod records;
pub mod settings;

pub use init::*;
pub use models::*;
pub use records::*;
