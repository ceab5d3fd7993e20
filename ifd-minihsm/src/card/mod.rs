//! Card-level data of the virtual reader

pub mod atr;

pub use atr::{build_atr, create_minihsm_atr};
