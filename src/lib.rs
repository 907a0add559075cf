//! Core library for Eclipse Tasks - session lifecycle, API client, models.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod storage;
pub mod utils;
