//! API Routes
//!
//! Route handlers organized by functionality.

pub mod analyze;
pub mod clients;
pub mod health;
