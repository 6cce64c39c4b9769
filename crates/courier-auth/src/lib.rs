//! Challenge-response authentication (CRA) for courier sessions.
//!
//! # Purpose
//! A client proves knowledge of a shared secret without sending it: the
//! broker issues a challenge bound to the session, and the client answers
//! with an HMAC-SHA256 signature of that challenge keyed by its secret.
//!
//! # How it fits
//! The broker's procedure table exposes the two handshake steps as the
//! `#authreq` and `#auth` procedures. Each session owns a [`SessionAuth`];
//! a single [`CraAuthenticator`] serves them all.
//!
//! # Key invariants
//! - A session holds at most one pending challenge.
//! - Any failed response returns the session to [`AuthState::Idle`].
//! - Once authenticated, a session stays authenticated for its lifetime.
//!
//! # Examples
//! ```rust
//! use courier_auth::{CraAuthenticator, SessionAuth, StaticSecrets, sign};
//! use courier_common::SessionId;
//! use std::sync::Arc;
//!
//! let cra = CraAuthenticator::new(Arc::new(StaticSecrets::from_iter([("app", "s3cret")])));
//! let session = SessionId::from("sess01");
//! let auth = SessionAuth::new();
//!
//! let challenge = cra.handle_auth_request(&session, &auth, "app", None).unwrap();
//! let signature = sign("s3cret", &challenge).unwrap();
//! cra.handle_auth_response(&session, &auth, &signature).unwrap();
//! assert!(auth.is_authenticated());
//! ```

mod cra;
mod errors;
mod secrets;
mod state;

pub use cra::{CraAuthenticator, sign};
pub use errors::{AuthError, AuthResult};
pub use secrets::{SecretProvider, StaticSecrets};
pub use state::{AuthState, SessionAuth};
