pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod views;

pub use auth::{admit, AuthenticatedUser, Role, TokenKeys};
pub use config::Config;
pub use error::{ErrorKind, HandlerErr};
pub use http::{build_router, AppState};
pub use model::{Mark, Session, Student, Subject};
pub use reconcile::{reconcile, Outcome, ReconcileInput, Reconciled};
pub use views::{build_roster, build_self_view, DateRange, SelfAttendanceView, SessionView};
