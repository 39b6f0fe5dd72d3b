//! wafctl - manage a Sucuri Web Application Firewall from the command line.
//!
//! The crate turns command-line flags and JSON templates into requests against the WAF
//! management API: whitelisting and blacklisting IP addresses, subnets and URL paths, and
//! updating firewall settings. All requests of a run are submitted concurrently and every
//! outcome is reported.
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! business logic inside `core`:
//! - `config`: the site config (`config.json`) and template documents, plus validation
//! - `core`: credential precedence, subnet expansion, request planning and execution
//! - `ports`: the [`WafApi`] trait the executor talks to
//! - `adapters`: the reqwest-based [`SucuriClient`]
//!
//! # Quick Example
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use wafctl::{ChangeSetBuilder, Credentials, Executor, Plan, SucuriClient};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let mut builder = ChangeSetBuilder::new();
//! builder.whitelist_subnet("example", "200.0.0.0/30");
//! let plan = Plan::build(&builder.build()?, None, false, 16)?;
//!
//! let credentials = Credentials {
//!     api_key: "key".to_string(),
//!     api_secret: "secret".to_string(),
//! };
//! let client = SucuriClient::new(wafctl::DEFAULT_API_URL, credentials, Duration::from_secs(30))?;
//! let report = Executor::new(Arc::new(client), 0).execute(&plan).await;
//! assert!(report.is_success());
//! # Ok(()) }
//! ```
//!
//! # Error Handling
//! Domain failures have their own `thiserror` types; application plumbing returns
//! `eyre::Result<T>` with context attached.
pub mod adapters;
pub mod config;
pub mod core;
pub mod ports;
pub mod tracing_setup;

pub use crate::{
    adapters::{DEFAULT_API_URL, SucuriClient},
    config::{ChangeSetBuilder, Credentials, SiteConfig, Template, TemplateValidator},
    core::{Executor, Plan, RunReport, WafAction},
    ports::waf_api::{ApiResponse, WafApi, WafApiError},
};
