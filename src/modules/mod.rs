//! # Filter Modules
//!
//! Each module implements the [`ModuleContract`](crate::module::ModuleContract)
//! trait for uniform lifecycle management.
//!
//! ## Available Modules
//!
//! - [`ip_restriction`] - Protected paths gated by a client address allow-list

pub mod ip_restriction;
