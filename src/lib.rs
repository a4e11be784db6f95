//! A virtual filesystem that overlays host directories and zip archives into
//! one read-mostly namespace.

pub mod virtfs;

pub use virtfs::*;
