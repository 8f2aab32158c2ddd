//! Test utilities for ScrapeDB.
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testing::TestConfigBuilder;
//!
//! let config = TestConfigBuilder::new()
//!     .sample_limit(1)
//!     .with_target_label("job", "node")
//!     .build();
//! ```

mod config_builder;

pub use config_builder::TestConfigBuilder;
