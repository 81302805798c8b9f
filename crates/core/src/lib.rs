//! Fresh Blooms Core - Shared types library.
//!
//! This crate provides common types used across all Fresh Blooms components:
//! - `storefront` - Checkout, webhook reconciliation and catalog API
//! - `cli` - Command-line tools for migrations, seeding and manual reconciliation
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money amounts, emails,
//!   order statuses and cart items

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
