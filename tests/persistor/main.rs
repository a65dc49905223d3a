//! Persistor Integration Tests
//!
//! End-to-end through the public facade:
//! - start-up: provisioning, open-only start, failure paths
//! - bus round trips for every action family
//! - stop and re-registration

mod common;

mod bus_round_trip;
mod lifecycle;
mod provisioning;
