//! # staffport-auth
//!
//! Authentication and authorization session lifecycle for the staffport
//! employee portal.
//!
//! This crate owns the portal's "hard part": deciding whether a session is
//! allowed into the protected area and which client records it may see,
//! consistently between the network edge and the in-page surface.
//!
//! ## Modules
//!
//! - [`store`] - credential store and directory traits (the backend seams)
//! - [`events`] - auth-change events emitted by credential stores
//! - [`context`] - the session context: shared session/user/profile state
//! - [`resolver`] - the scoped client-access resolver
//! - [`gate`] - edge gatekeeper route decisions
//! - [`config`] - auth settings (timeouts, gate paths)
//! - [`error`] - error types

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod gate;
pub mod resolver;
pub mod store;

pub use config::{AuthSettings, ConfigError};
pub use context::{AuthSnapshot, SessionContext};
pub use error::{AuthError, AuthResult};
pub use events::AuthChange;
pub use gate::{GateConfig, GateDecision, RouteClass};
pub use resolver::{ClientResolver, ClientsView};
pub use store::{CredentialStore, Directory, TokenResolution};
