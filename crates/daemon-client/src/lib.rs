//! # Daemon client
//!
//! Build-and-discover client for a container engine's HTTP control-plane API.
//!
//! The client turns an in-memory [`Project`] into a built image and finds the
//! services this tool created earlier, reconciling raw daemon state into
//! [`Service`] values. It is synchronous: every operation blocks the calling
//! thread until the daemon answers or the request timeout elapses, and no
//! call is ever retried.
//!
//! ## Example
//!
//! ```no_run
//! use daemon_client::{Client, Project};
//!
//! # fn example() -> daemon_client::Result<()> {
//! let client = Client::connect("127.0.0.1", 2375)?;
//!
//! let project = Project::new("hello")
//!     .with_file("Dockerfile", "FROM node:20\nCOPY app.js /\nCMD node /app.js")
//!     .with_file("app.js", "require('http').createServer().listen(3000)");
//!
//! let built = client.build(&project)?;
//! println!("built image {}", built.image);
//!
//! for service in client.list("")? {
//!     println!("{} {:?} {:?}:{:?}", service.name, service.state, service.host, service.port);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod archive;
pub mod build;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod models;
pub mod transport;

pub use archive::{ArchiveBuilder, ArchiveSummary, make_tar};
pub use build::{BUILD_LOG_TARGET, BuildProgress};
pub use client::Client;
pub use config::ClientConfig;
pub use discovery::ContainerFilters;
pub use error::{Error, Result};
pub use models::{BuildLabels, OWNER_LABEL_KEY, OWNER_LABEL_VALUE, Project, ProjectFile, Service};
pub use transport::{NO_QUERY, Transport};
