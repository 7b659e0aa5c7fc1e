//! Emitters fed by the linked table: generated sources and shrinker
//! keep rules.

pub mod java;
pub mod proguard;

pub use proguard::KeepSet;
