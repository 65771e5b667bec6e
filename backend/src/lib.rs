//! bizdesk library
//!
//! Document management for a production business: quotations, invoices,
//! production tickets, plannings and expenses, with optimistic locking,
//! transactional child reconciliation and shared document numbering.

pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod hooks;
pub mod lock;
pub mod services;
