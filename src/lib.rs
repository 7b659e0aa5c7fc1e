//! reslink - a linker for precompiled Android resources.
//!
//! This crate provides the core library functionality for reslink:
//! merging resource tables from compiled inputs, resolving symbolic
//! references to numeric IDs, versioning configuration-qualified
//! resources, splitting along configuration axes, and packaging the
//! result into application archives.

pub mod codec;
pub mod core;
pub mod emit;
pub mod io;
pub mod link;
pub mod util;

pub use crate::core::{
    ConfigDescription, ResourceId, ResourceName, ResourceTable, ResourceType, Source,
};
pub use crate::link::driver::{LinkCommand, LinkOptions};
pub use crate::link::LinkContext;
pub use crate::util::Diagnostics;
