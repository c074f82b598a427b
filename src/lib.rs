pub mod cli;
pub mod client;
pub mod config;
pub mod decode;
pub mod process;
pub mod progress;
pub mod session;
pub mod store;
pub mod supervisor;
pub mod tool;
