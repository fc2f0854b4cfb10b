// Utility submodules shared by the core subsystems.

pub mod binary;
pub mod checksum;
pub mod compression;
pub mod http;
pub mod path_helpers;
pub mod platform;
pub mod timestamps;
