//! Callpad: a terminal HTTP request composer.
//!
//! Requests are written as templates whose URL, headers and body may carry
//! `{{Namespace.KEY}}` tokens. Tokens are resolved against three variable
//! sources (`Var` for the process environment, `Home` for a user file and
//! `User` for values set in the session) right before the call goes out.
//! Every completed call lands in the history of the current profile, and
//! each profile is persisted as its own JSON file under the state directory.

pub mod args;
pub mod config;
pub mod decoder;
pub mod env;
pub mod error;
pub mod history;
pub mod http;
pub mod manager;
pub mod profile;
pub mod repl;
pub mod session;
pub mod store;
pub mod template;

pub use env::{Environment, SourceKind, VariableSource};
pub use error::{Error, ErrorKind, Result};
pub use history::{CallRecord, History};
pub use http::{HttpClient, HttpMethod, RequestSnapshot, ResponseSnapshot};
pub use manager::ProfileManager;
pub use profile::Profile;
pub use session::Session;
pub use template::{Collection, RequestTemplate};
