//! Utilities shared by the library and the demo binary

pub mod logging;

pub use logging::init_logger;
