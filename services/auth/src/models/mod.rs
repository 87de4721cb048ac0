//! Authentication service models

pub mod session;
pub mod user;
pub mod verification;

// Re-export for convenience
pub use session::{IssuedToken, NewSession, SessionToken, SessionTokens, TokenKind};
pub use user::{User, UserId};
pub use verification::{CodeStatus, NewVerificationCode, RequestType, VerificationCode};
