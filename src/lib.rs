pub mod api;
pub mod app;
pub mod config;
pub mod dispatch;
pub mod session;
pub mod types;
pub mod util;

#[cfg(test)]
pub mod test_support;
