//! Push-subscription HTTP host.

pub mod pubsub;
pub mod server;

pub use pubsub::{PushMessage, PushRequest};
pub use server::{NotifierServer, ServerConfig};
