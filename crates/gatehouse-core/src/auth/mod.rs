//! Authentication: the session credential and the flows that create and
//! destroy it.
//!
//! - `Session`: the persisted credential slot (bearer token or cookie)
//! - `CredentialStore`: remembered passwords via the OS keychain
//! - `CallbackParams` / `CallbackListener`: OAuth redirect parsing and the
//!   loopback listener that receives it
//! - `AuthFlow`: begin OAuth, complete the callback, password login, logout

pub mod callback;
pub mod credentials;
pub mod flow;
pub mod session;

pub use callback::{
    BrowserCallback, CallbackListener, CallbackParams, CALLBACK_PATH, DEFAULT_CALLBACK_TIMEOUT,
};
pub use credentials::CredentialStore;
pub use flow::{AuthFlow, SignedIn};
pub use session::{Credential, Session, SessionData};
