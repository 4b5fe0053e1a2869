pub mod config;
pub mod maven;
pub mod sync;
pub mod util;
