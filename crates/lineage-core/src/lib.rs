//! Core types, decision rules and trait definitions for the Lineage entity
//! resolver.
//!
//! Lineage resolves which registered issuer (an [`EntityKey`]) a ticker symbol
//! referred to over each half-open [`Window`] of time, and which canonical
//! legal name that issuer carried. The pipeline, leaves first:
//!
//! 1. [`membership`]: derive ticker windows from index-membership feeds.
//! 2. [`aggregate`]: collect candidate entities and their filing features.
//! 3. [`rules`]: auto-accept a candidate or route the window to review.
//! 4. [`adjudication`]: validate human decisions for the ledger.
//! 5. [`merge`] and [`names`]: produce curated, non-overlapping episodes.
//!
//! This crate is deliberately free of database and runtime dependencies.
//! Storage backends implement [`store::EvidenceStore`].

// Native `async fn` in traits; the store trait spells out `Send` bounds itself.
#![allow(async_fn_in_trait)]

pub mod adjudication;
pub mod aggregate;
pub mod entity;
pub mod error;
pub mod evidence;
pub mod lifecycle;
pub mod membership;
pub mod merge;
pub mod names;
pub mod policy;
pub mod rules;
pub mod store;
pub mod ticker;
pub mod window;

pub use entity::EntityKey;
pub use error::{
  DataQualityError, EmptyCandidateSet, Error, MergeInvariantViolation, Result,
  ValidationError,
};
pub use ticker::Ticker;
pub use window::Window;
