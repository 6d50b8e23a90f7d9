//! Phone verification codes and bearer-token sessions.

mod session;
mod verification;

pub use session::{AuthUser, SessionError, SessionManager};
pub use verification::{VerificationError, VerificationService};
