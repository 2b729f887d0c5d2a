//! stampede: a scriptable VU-based HTTP load testing engine.
//!
//! A test script declares *scenarios* (workload shapes run by fleets of
//! virtual users) and the requests each iteration performs. The engine
//! schedules scenarios across a bounded worker pool, measures every fetch and
//! iteration into tagged trends, and reports min/max/avg/percentile summaries
//! with an optional threshold verdict driving the exit code.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod module;
pub mod output;
pub mod types;
