//! Reconciliation of registry snapshots into the record tree
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ PackageFeed  │────▶│   Importer   │────▶│  Reconciler  │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                             │                    │
//!                             ▼                    ▼
//!                      ┌──────────────┐     ┌──────────────┐
//!                      │   Notifier   │     │ RecordStore  │
//!                      └──────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`reconciler`]: converts one package snapshot into records
//! - [`importer`]: batch runs, seen-set tracking and pruning
//! - [`notify`]: event and cache invalidation hooks

pub mod importer;
pub mod notify;
pub mod reconciler;

pub use importer::{ImportSummary, Importer};
pub use notify::{CacheInvalidator, ChannelNotifier, Event, Notifier, TracingNotifier};
pub use reconciler::PackageReconciler;
