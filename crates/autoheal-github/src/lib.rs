//! GitHub Actions backend for the autoheal workflow adapter.
//!
//! [`GitHubActionsClient`] implements [`autoheal_core::WorkflowApi`] over the
//! REST API. Plug it into a [`autoheal_core::WorkflowRunAdapter`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use autoheal_core::WorkflowRunAdapter;
//! use autoheal_github::{GitHubActionsClient, GitHubConfig};
//!
//! let client = GitHubActionsClient::new(GitHubConfig::from_env()).unwrap();
//! let adapter = WorkflowRunAdapter::new(Arc::new(client));
//! ```

pub mod client;
pub mod config;

pub use client::GitHubActionsClient;
pub use config::GitHubConfig;
