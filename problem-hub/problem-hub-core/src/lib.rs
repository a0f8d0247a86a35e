pub mod accounts;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod groups;
pub mod model;
pub mod permissions;
pub mod problems;
pub mod scheduler;
pub mod storage;
pub mod tags;
pub mod views;

pub use error::{HubError, Result};
