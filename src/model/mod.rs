pub mod config;
pub mod pitch;
pub mod scales;
pub mod song;
