pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod pipeline;
pub mod session;
pub mod signals;
pub mod stats;
