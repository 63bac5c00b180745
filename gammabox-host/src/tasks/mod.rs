//! Background threads

pub mod reader;

pub use reader::{spawn_reader, ReaderHandle};
