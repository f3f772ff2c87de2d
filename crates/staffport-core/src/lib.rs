//! # staffport-core
//!
//! Domain model for the staffport employee portal.
//!
//! This crate defines the read-only projections of backend rows that the
//! portal works with:
//!
//! - [`Identity`] - an authenticated principal at the identity-provider level
//! - [`Profile`] - portal-specific role/display metadata for an identity
//! - [`Role`] - the enumerated permission tier
//! - [`Session`] - token material for one authenticated login
//! - [`Client`] / [`ClientAssignment`] - domain records and the link rows
//!   that scope their visibility
//!
//! The role predicate ([`Role::grants_portal_access`]) lives here so that
//! both enforcement points (the edge gatekeeper and the dashboard surface)
//! share one definition of "staff".

pub mod client;
pub mod identity;
pub mod session;

pub use client::{Client, ClientAssignment};
pub use identity::{Identity, Profile, Role, is_staff};
pub use session::Session;
