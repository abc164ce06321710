//! Text utilities shared across the botline crates.

pub mod text;
