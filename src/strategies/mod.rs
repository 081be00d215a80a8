pub mod common;
pub mod grid;
