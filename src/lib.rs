//! Load-testing harness for the user and email services.
//!
//! Virtual users ([`load_generator`]) run weighted tasks ([`scenarios`])
//! through timed HTTP clients ([`client`]); every request lands in the
//! [`metrics::MetricsAggregator`], which also samples host resources and
//! drives the terminal [`dashboard`].

pub mod client;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod load_generator;
pub mod metrics;
pub mod mock;
pub mod scenarios;

pub use error::{HarnessError, HarnessResult};
