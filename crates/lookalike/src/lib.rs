//! Watchtower Lookalike Engine
//!
//! Generates lookalike candidates for monitored domains, resolves them, and
//! classifies parking status:
//! - Algorithmic fuzzers plus malicious-TLD expansion
//! - Batch DNS resolution with bounded concurrency
//! - Three-tier parking cascade (nameservers, URLScan, HTTP probe)

pub mod fuzzers;
pub mod generator;
pub mod parking;
pub mod resolver;

pub use generator::{GeneratorOptions, LookalikeGenerator};
pub use parking::{ParkingClassifier, ParkingVerdict, DEFAULT_PARKING_WORKERS};
pub use resolver::CandidateResolver;
