#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod cache;
pub mod config;
pub mod core;
pub mod engine;
pub mod filter;
pub mod optimize;
pub mod stats;

#[cfg(test)]
mod testing;

pub use engine::GeoFilter;
