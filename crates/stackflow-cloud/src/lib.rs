//! StackFlow reconciliation engine
//!
//! This crate provides the generic part of the StackFlow operator: the
//! contract every resource reconciler implements, the diff/patch algorithm,
//! ordered resource chains and the version router that lets several chains
//! coexist.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │            driver (watch / resync loop)          │
//! └─────────────────┬───────────────────────────────┘
//!                   │ reconcile(instance)
//! ┌─────────────────▼───────────────────────────────┐
//! │                 VersionRouter                    │
//! │   version marker ──► ResourceChain (per version) │
//! └─────────────────┬───────────────────────────────┘
//!                   │ in order
//! ┌─────────────────▼───────────────────────────────┐
//! │  Resource: current ─► desired ─► Patch ─► apply  │
//! │  s3bucket ─► iamrole ─► cloudformation ─► elb    │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! Concrete reconcilers live in `stackflow-aws`.

pub mod chain;
pub mod diff;
pub mod error;
pub mod patch;
pub mod resource;
pub mod router;

// Re-exports
pub use chain::{ChainBuilder, PassReport, ResourceChain, ResourceReport};
pub use error::{ErrorClass, Phase, ReconcileError, Result};
pub use patch::{Change, ChangeKind, Patch, PatchSummary, ResourceItem};
pub use resource::{Instance, Resource};
pub use router::VersionRouter;
