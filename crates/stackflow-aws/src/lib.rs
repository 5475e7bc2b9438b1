//! StackFlow AWS reconcilers
//!
//! Concrete [`Resource`](stackflow_cloud::Resource) implementations for the
//! guest cluster footprint, the stack composer that builds the cluster's
//! CloudFormation template, and the per-version chain construction.
//!
//! ```text
//! ClusterSpec ──► VersionRouter ──► ResourceChain (1.0.0 | 2.0.0)
//!                                     │
//!         ┌──────────────┬────────────┼──────────────┬───────────────┐
//!         ▼              ▼            ▼              ▼               │
//!     s3bucket        iamrole   cloudformation   loadbalancer        │
//!         │              │            │              │               │
//!         ▼              ▼            ▼              ▼               │
//!     S3Client       IamClient  CloudFormation    ElbClient   ◄── Clients
//!                                 Client ▲
//!                                        │
//!                               StackComposer + adapters
//! ```
//!
//! The client traits are the seam to the provider API; [`MemoryCloud`]
//! implements all of them in process.

pub mod adapter;
pub mod bootstrap;
pub mod client;
pub mod composer;
pub mod error;
pub mod key;
pub mod memory;
pub mod resource;
pub mod spec;
pub mod template;
pub mod versions;

pub use bootstrap::{BootstrapRenderer, CloudConfigRenderer, NodeRole};
pub use client::{Clients, CloudFormationClient, ElbClient, IamClient, S3Client};
pub use composer::{Adapter, AdapterContext, StackComposer};
pub use error::{AwsError, Result};
pub use memory::{MemoryCloud, Snapshot};
pub use spec::ClusterSpec;
pub use template::{ComposedStack, Fragment, StackTemplate};
pub use versions::{ChainConfig, V1, V2, VERSIONS, new_router};
