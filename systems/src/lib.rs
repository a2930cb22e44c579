pub mod config;
pub mod m6809_system;
pub mod registry;
pub mod srecord;
