pub mod collector;

pub mod fixtures;

pub use collector::{recv_line, spawn_line_collector};
