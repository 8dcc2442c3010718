//! # Radio Gateway Test Suite
//!
//! End-to-end scenarios driving a [`RadioGateway`](radio_gateway::RadioGateway)
//! against the in-memory loopback backend.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs        # Gateway + loopback fixture
//!     ├── lifecycle.rs      # Submit, respond, exactly-once delivery
//!     ├── negotiation.rs    # Descending probe, disable, overrides
//!     ├── recovery.rs       # Backend death, stale cookies, reset scope
//!     ├── acknowledgement.rs# Handshake guard flows
//!     ├── timeouts.rs       # Synthetic results and hold expiry
//!     └── shutdown.rs       # Transport failure and shutdown
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p radio-tests
//! cargo test -p radio-tests integration::recovery::
//! ```

pub mod integration;
