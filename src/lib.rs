pub mod api;
pub mod config;
pub mod history;
pub mod logs;
pub mod selection;
pub mod session;
