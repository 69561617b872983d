pub mod actions;
pub mod config;
pub mod coords;
pub mod error;
pub mod gestures;
pub mod logging;
pub mod models;
pub mod runner;
pub mod shell;
pub mod state;
pub mod volume_key;
