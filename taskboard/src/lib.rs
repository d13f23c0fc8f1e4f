//! `Taskboard` client library: realtime-synchronized task lists over a
//! hosted backend.

pub mod account;
pub mod board;
pub mod config;
pub mod dashboard;
pub mod demo;
pub mod forms;
pub mod gateway;
pub mod session;
