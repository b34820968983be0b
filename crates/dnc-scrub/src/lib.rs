//! Compliance scrubbing pipeline for outbound contact lists.
//!
//! Uploaded leads are normalized, deduplicated and scored against Do-Not-Call
//! registries and litigator blocklists. Registry data is kept current through
//! incremental change lists applied by [`workflows::registry`].

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
