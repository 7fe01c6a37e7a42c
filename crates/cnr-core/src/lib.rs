//! # cnr-core — Foundational Types for the Company Name Registry
//!
//! Every other crate in the workspace depends on `cnr-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `RequestId`, `UserId`,
//!    `InvoiceId`, `ProvinceId`, `CompanyTypeId` are distinct types. You
//!    cannot pass an invoice number where a request number is expected.
//!
//! 2. **A closed role catalog.** `Role` is a single enum with an exhaustive
//!    `match` everywhere. The `System` role is reserved for the background
//!    sweeper and cannot be claimed by a human actor.
//!
//! 3. **Injectable time.** All deadline arithmetic flows through the `Clock`
//!    trait so reservation expiry can be tested deterministically.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `cnr-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod config;
pub mod error;
pub mod identity;
pub mod role;
pub mod temporal;

pub use config::WorkflowConfig;
pub use error::{ConfigError, ValidationError};
pub use identity::{CompanyTypeId, InvoiceId, ProvinceId, RequestId, UserId};
pub use role::{ActorContext, Role};
pub use temporal::{Clock, ManualClock, SystemClock};
