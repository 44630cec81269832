// KiwiRay motion-control and serial protocol driver

pub mod comm;
pub mod config;
pub mod emoticon;
pub mod messages;
pub mod motion;
pub mod plugin;
pub mod protocol;
pub mod runtime;
pub mod serial;
pub mod shared;

pub use plugin::{Host, KiwiRay, Plugin, PluginError};
