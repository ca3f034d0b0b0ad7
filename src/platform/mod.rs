//! External collaborators: credential checks and platform reporting

pub mod auth;
pub mod reporter;

pub use auth::{AuthProvider, JwtAuth};
pub use reporter::{HttpReporter, LogReporter, PlatformReporter, ReportError, ReportResult};
