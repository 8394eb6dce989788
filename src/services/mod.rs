pub mod auth_guard;
pub mod auth_service;
pub mod auth_service_impl;
pub mod avatar_pipeline;
pub mod credentials;
pub mod identity_cache;
pub mod image;
pub mod session_registry;

pub use auth_guard::{AuthGuard, AuthStrategy, BearerStrategy, SessionCookieStrategy};
pub use auth_service::{
    AuthError, AuthFailure, AuthResult, AuthService, Principal, RefreshResult, TokenPair,
};
pub use auth_service_impl::SeaOrmAuthService;
pub use avatar_pipeline::AvatarPipeline;
pub use credentials::{CredentialService, TokenKind};
pub use identity_cache::{CacheLookup, IdentityCache};
pub use session_registry::SessionRegistry;
