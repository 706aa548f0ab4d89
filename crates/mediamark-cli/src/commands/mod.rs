//! Command handlers

pub mod annotation;
pub mod bookmark;
pub mod config;
pub mod session;
pub mod status;
