//! Client environment port
//!
//! The host application knows where the user is (user agent, current route)
//! and who they are. The pipeline asks at capture time and copies the answer
//! into the entry; it never keeps a live link to the session.

use crate::domain::entry::ClientOrigin;

/// Port trait for reading the client's execution context
pub trait IClientEnvironment: Send + Sync {
    /// User agent and current URL
    fn origin(&self) -> ClientOrigin;

    /// Id of the signed-in user, if any
    fn current_actor(&self) -> Option<String>;
}
