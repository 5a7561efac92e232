//! Read access to the current user token.
//!
//! Token acquisition and refresh belong to the surrounding SDK. The engine
//! only needs the latest value when it builds an `Authorization` header, so
//! it holds a [`TokenReceiver`] fed by whoever owns the token.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//! use common::token::token_channel;
//!
//! let (publisher, receiver) = token_channel(SecretString::from("first"));
//! assert_eq!(receiver.token().expose_secret(), "first");
//!
//! publisher.publish(SecretString::from("refreshed"));
//! assert_eq!(receiver.token().expose_secret(), "refreshed");
//! ```

use crate::secret::SecretString;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// Errors from the token channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Publisher dropped.
    #[error("Token channel closed")]
    ChannelClosed,
}

/// Create a publisher/receiver pair seeded with an initial token.
#[must_use]
pub fn token_channel(initial: SecretString) -> (TokenPublisher, TokenReceiver) {
    let (sender, receiver) = watch::channel(initial);
    (TokenPublisher(sender), TokenReceiver(receiver))
}

/// Sending half, held by the token owner.
pub struct TokenPublisher(watch::Sender<SecretString>);

impl TokenPublisher {
    /// Replace the current token. Receivers see the new value on their next read.
    pub fn publish(&self, token: SecretString) {
        if self.0.send(token).is_err() {
            debug!(target: "common.token", "All token receivers dropped");
        }
    }
}

impl std::fmt::Debug for TokenPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPublisher").finish_non_exhaustive()
    }
}

/// Wrapper around watch receiver that provides safe token access.
///
/// Callers never hold the borrow lock longer than a clone, which would
/// otherwise block the publisher.
#[derive(Clone)]
pub struct TokenReceiver(watch::Receiver<SecretString>);

impl TokenReceiver {
    /// Get the current token.
    #[must_use]
    pub fn token(&self) -> SecretString {
        self.0.borrow().clone()
    }

    /// Wait for the token to change.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::ChannelClosed` if the publisher is dropped.
    pub async fn changed(&mut self) -> Result<(), TokenError> {
        self.0
            .changed()
            .await
            .map_err(|_| TokenError::ChannelClosed)
    }

    /// Build a receiver around a fixed token, for tests.
    #[cfg(any(test, feature = "test-utils"))]
    #[must_use]
    pub fn fixed(token: &str) -> Self {
        let (_sender, receiver) = watch::channel(SecretString::from(token.to_string()));
        Self(receiver)
    }
}

impl std::fmt::Debug for TokenReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenReceiver")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::secret::ExposeSecret;

    #[test]
    fn test_receiver_debug_redacts() {
        let (_publisher, receiver) = token_channel(SecretString::from("secret-token"));

        let debug_str = format!("{receiver:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("secret-token"));
    }

    #[test]
    fn test_fixed_receiver_outlives_sender() {
        let receiver = TokenReceiver::fixed("fixed-token");
        assert_eq!(receiver.token().expose_secret(), "fixed-token");
    }

    #[tokio::test]
    async fn test_changed_observes_publish() {
        let (publisher, mut receiver) = token_channel(SecretString::from("t1"));
        let cloned = receiver.clone();

        publisher.publish(SecretString::from("t2"));
        receiver.changed().await.unwrap();

        assert_eq!(receiver.token().expose_secret(), "t2");
        assert_eq!(cloned.token().expose_secret(), "t2");
    }

    #[tokio::test]
    async fn test_changed_errors_when_publisher_dropped() {
        let (publisher, mut receiver) = token_channel(SecretString::from("t1"));
        drop(publisher);

        assert_eq!(receiver.changed().await, Err(TokenError::ChannelClosed));
    }
}
