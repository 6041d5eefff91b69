//! Testing infrastructure for Kaizen.
//!
//! Test doubles for the two external seams: analysis agents and observer
//! connections. Both are builder-style mocks with controllable behavior
//! and call recording, so loop and hub behavior can be tested without
//! real analyzers or sockets.
//!
//! # Example
//!
//! ```rust
//! use kaizen::agent::AgentTask;
//! use kaizen::testing::MockAgent;
//!
//! let agent = MockAgent::new("structure").with_scores(vec![70.0, 80.0, 80.0]);
//! assert_eq!(agent.id(), "structure");
//! ```

pub mod mocks;

pub use mocks::{MockAgent, MockConnection};
