//! Gatherly - group activity planner
//!
//! This library provides the core functionality for Gatherly: activities,
//! participant preference capture, plan synthesis and notifications.

pub mod api;
pub mod config;
pub mod db;
pub mod llm;
pub mod models;
pub mod notify;
pub mod services;
