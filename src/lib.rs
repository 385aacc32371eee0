//! # Sprintgrid
//!
//! A sprint calendar engine and resilient data-access layer for team
//! capacity dashboards.
//!
//! Teams plan work in fixed-length (1–4 week) recurring sprints on a
//! Sunday–Thursday business week. This library provides the two parts of
//! that system with real invariants and failure semantics:
//!
//! - **Calendar engine** ([`calendar`]): pure sprint-period arithmetic,
//!   working-day enumeration, containing-period detection with a
//!   deterministic fallback, and display-calendar layout with weekend
//!   reference cells. Period offsets always shift the anchor sprint's own
//!   bounds, never "today", so forward/backward navigation can never cycle
//!   across a month boundary.
//! - **Resilient fetch pipeline** ([`fetch`]): a TTL request cache that
//!   de-duplicates concurrent identical fetches, per-dependency circuit
//!   breakers with timeout protection and exponential reopen backoff, and
//!   a data consistency manager that validates fetched batches against
//!   caller-supplied invariants before they may reach application state.
//!
//! The [`source`] module defines the record-source collaborator interface
//! and a dashboard loader that fans out multi-entity loads under a coarse
//! view timeout, discarding superseded or cancelled results before any
//! state mutation. [`config`] owns the versioned current-sprint record and
//! engine settings.
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use sprintgrid::calendar::{detect_current_sprint_for_date, Sprint};
//!
//! let anchor = Sprint::new(42, NaiveDate::from_ymd_opt(2025, 8, 10).unwrap(), 2);
//! let view = detect_current_sprint_for_date(
//!     NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(),
//!     Some(&anchor),
//! );
//! assert_eq!(view.sprint_name, "Sprint 42");
//! assert_eq!(view.working_days.len(), 10);
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Sprint calendar engine: arithmetic, detection, layout.
pub mod calendar;
/// Engine settings and the current-sprint configuration store.
pub mod config;
/// Resilient fetch pipeline: request cache, circuit breaker, consistency.
pub mod fetch;
/// Record-source collaborator interface and dashboard loader.
pub mod source;
/// Shared utilities.
pub mod util;
