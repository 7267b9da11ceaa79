//! Discord webhook delivery.
//!
//! - [`message`]: the embed payload rendered for one article
//! - [`transport`]: a single POST, behind the [`Transport`] trait
//! - [`notifier`]: rendering plus bounded retries on top of a transport

pub mod message;
pub mod notifier;
pub mod transport;

pub use notifier::Notifier;
pub use transport::{HttpTransport, Transport};
