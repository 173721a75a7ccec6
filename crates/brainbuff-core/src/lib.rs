pub mod config;
pub mod geometry;
pub mod ipc;
pub mod question;
