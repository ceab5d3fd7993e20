//! minihsm Applet
//!
//! PIN/PUK credential gate with a small lifecycle, driven by VERIFY,
//! CHANGE REFERENCE DATA and RESET RETRY COUNTER.

pub mod applet;
pub mod credential;
pub mod lifecycle;

pub use applet::{CommandError, MiniHsmApplet};
pub use credential::Credential;
pub use lifecycle::LifecycleState;
