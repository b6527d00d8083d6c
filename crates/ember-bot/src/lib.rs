pub mod app;
pub mod config;
pub mod handlers;
pub mod lock;
pub mod poller;
pub mod webhook;

pub use app::App;
pub use config::Config;
