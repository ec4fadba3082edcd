//! Notification pipeline.

pub mod delivery;
pub mod notifier;
pub mod view;

pub use delivery::{DELIVERY_USER_AGENT, DeliveryOutcome, WebhookClient, encode_payload};
pub use notifier::{HandleOutcome, HttpNotifier, Notifier, TEMPLATE_NAME};
pub use view::{BuildView, TemplateView};
