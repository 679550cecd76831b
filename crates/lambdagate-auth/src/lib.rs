//! SigV4 request authentication for LambdaGate.
//!
//! This crate verifies that an incoming Lambda API request was signed by a
//! workload identity known to the cluster. Key material is not configured
//! statically: it is resolved per request from a locally synchronized view of
//! the identity store ([`identity::IdentityCache`]), scoped to the tenant
//! partition named by the credential-scope region.
//!
//! # Overview
//!
//! - [`authenticator`] - The request authenticator state machine that gates
//!   every routed handler
//! - [`canonical`] - Canonical request construction over the signable header
//!   allow-list
//! - [`credentials`] - Secret resolution (fast path and owner-annotation scan)
//! - [`error`] - Authentication error types and their wire codes
//! - [`identity`] - The synchronized identity/secret cache
//! - [`sigv4`] - Authorization header grammar and signature recomputation
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use lambdagate_auth::authenticator::{AuthenticatorConfig, RequestAuthenticator};
//! use lambdagate_auth::credentials::StaticSecretResolver;
//!
//! let secrets = StaticSecretResolver::new(vec![(
//!     "prod".into(),
//!     "builder".to_owned(),
//!     "s3cr3t".to_owned(),
//! )]);
//! let authenticator = RequestAuthenticator::new(
//!     AuthenticatorConfig::default(),
//!     Arc::new(secrets),
//! );
//! // Call `authenticator.authenticate(&parts, &body)` for each request.
//! # let _ = authenticator;
//! ```

pub mod authenticator;
pub mod canonical;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod sigv4;

pub use authenticator::{AuthenticatedContext, AuthenticatorConfig, RequestAuthenticator};
pub use credentials::{CredentialStore, SecretResolver, StaticSecretResolver};
pub use error::{AuthError, AuthErrorCode, CredentialError};
pub use identity::IdentityCache;
