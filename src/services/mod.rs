//! Service layer for I/O concerns kept apart from the core algorithms

pub mod io;

pub use io::ImageIOService;
