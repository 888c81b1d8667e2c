//! # TxGuard Test Suite
//!
//! Cross-node scenarios run against in-process clusters.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs           # Cluster setup, listeners
//!     ├── label_guarantee.rs    # Labels, local and remote guarantees
//!     ├── remote_propagation.rs # Retain, stop_listen, timeouts, isolation
//!     └── outcomes.rs           # Notifications, storage failure, commit lock
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p txguard-tests
//! cargo test -p txguard-tests integration::label_guarantee::
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]
