//! # homedash-domain
//!
//! Pure domain model for the homedash hub client.
//!
//! ## Responsibilities
//! - Foundational types: typed entity identifiers, error taxonomy
//! - Define **Entities** (latest observed state of lights, locks, sensors, …)
//!   and their **Domains** (behaviour category derived from the identifier)
//! - Define the **Identifier Filter** (allow-list of cached entities)
//! - Define **Service calls** (commands sent to the hub)
//! - Define the **connection settings** and the **observable status**
//! - Define **Sync events** published to observers
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod connection;
pub mod error;
pub mod id;

pub mod entity;
pub mod event;
pub mod filter;
pub mod service;
