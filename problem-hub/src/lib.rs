//! HTTP front end of the problem tracker.

pub mod api;
