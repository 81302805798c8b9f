//! Fresh Blooms storefront library.
//!
//! Checkout and order reconciliation for the Fresh Blooms flower shop:
//! creates Stripe checkout sessions for browser carts, and turns
//! `checkout.session.completed` webhooks into paid orders, order items and
//! stock decrements exactly once per purchased line.
//!
//! The binary in `main.rs` wires these modules to configuration, logging
//! and an HTTP listener; the CLI and integration tests reuse them directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod stripe;
