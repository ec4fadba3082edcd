//! Build-event webhook notifier.
//!
//! An [`HttpNotifier`] is configured once with a filter expression, a
//! message template and a destination URL. For every build event it:
//!
//! 1. evaluates the filter and drops events that do not match,
//! 2. resolves template parameters through a [`BindingResolver`],
//! 3. adds campaign tracking parameters to the build's log URL,
//! 4. renders the template against `{ Build, Params }`,
//! 5. POSTs the result, encoded as a JSON string, to the destination.
//!
//! Delivery is attempted once. A response with any status counts as
//! delivered; only transport failures and cancellation are errors.

pub mod bindings;
pub mod build;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod logging;
pub mod notification;
pub mod utils;

pub use bindings::{BindingResolver, Bindings, EnvSecretGetter, ParamsBindingResolver, SecretGetter};
pub use build::{Build, BuildStatus};
pub use config::NotifierConfig;
pub use context::{ContextError, RequestContext};
pub use error::{Error, Result};
pub use notification::{HandleOutcome, HttpNotifier, Notifier};
