//! Codecs for the on-disk formats at the tool boundary.

pub mod binary;
pub mod compiled;
pub mod table;
pub mod xml;
