pub mod config;
pub mod descriptor;
pub mod dirs;
pub mod error;
pub mod freeze;
pub mod graph;
pub mod host;
pub mod manifest;
pub mod packer;
pub mod resource;
pub mod toolchain;
pub mod tracer;
pub mod transpiler;
pub mod types;
pub mod unit;

#[cfg(test)]
mod test_support;
