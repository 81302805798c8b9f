//! Core types for Fresh Blooms.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod email;
pub mod id;
pub mod money;
pub mod status;

pub use cart::{CartError, CartItem, cart_total};
pub use email::{Email, EmailError};
pub use id::*;
pub use money::Paise;
pub use status::*;
