//! Store abstractions and their PostgreSQL and in-memory implementations

pub mod session;
pub mod user;
pub mod verification;

pub use session::{MemorySessionStore, PgSessionStore, SessionStore};
pub use user::{MemoryUserDirectory, UserDirectory, UserRepository};
pub use verification::{MemoryVerificationCodeStore, PgVerificationCodeStore, VerificationCodeStore};
