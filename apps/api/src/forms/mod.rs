//! Form pages: shallow validation, then a single insert or update.

pub mod application;
pub mod auth;
pub mod handlers;
pub mod listing;
pub mod payment;
pub mod profile;
pub mod validation;
