//! Booking portal integration: fetching, extracting and caching the hours
//! booked against GitLab tickets.

mod breaker;
mod client;
mod extract;
mod gate;
mod hours;
mod location;
mod pipeline;
mod settings;
pub(crate) mod types;

pub use client::HttpTransport;
pub use location::Location;
pub use pipeline::{Notice, Pipeline, Progress, ProgressRequest, SkipReason};
pub use settings::{FeatureFlags, ProjectSettings};
pub use types::DEFAULT_BOOKED_LABEL;
