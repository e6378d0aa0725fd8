pub mod accounts;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub(crate) mod handlers;
pub mod password;
pub mod state;
pub mod storage;
pub mod token;
