pub mod error;
pub mod sessions;
pub mod status;
