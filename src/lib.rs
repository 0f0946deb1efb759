pub mod app;
pub mod auth;
pub mod classify;
pub mod error;
pub mod java;
pub mod launch;
pub mod login;
pub mod logs;
pub mod platform;
pub mod rewrite;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod sniff;
pub mod store;
pub mod utils;

pub use app::App;
pub use error::{Error, Result};
