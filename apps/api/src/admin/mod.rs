//! Admin console: dashboard metrics, user and plan management, and the live
//! users view.

pub mod aggregation;
pub mod handlers;
pub mod live;
pub mod service;
