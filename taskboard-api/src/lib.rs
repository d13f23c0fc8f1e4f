//! `Taskboard` privileged API: holds the backend's service credential and
//! performs the operations a signed-in user's credential cannot.

pub mod backend;
pub mod config;
pub mod server;
