//! Client Transport Port - Outbound Delivery to One Observer
//!
//! The connection registry owns one transport per connected client.
//! Implementations must deliver messages in submission order and must
//! not block the caller on a slow consumer.

use async_trait::async_trait;

use crate::domain::error::DeliveryError;

/// Outbound half of a client connection.
#[async_trait]
pub trait ClientTransport: Send + Sync + 'static {
  /// Queue a serialized JSON frame for delivery.
  ///
  /// # Errors
  /// Returns `DeliveryError` when the connection is gone or saturated.
  async fn send(&self, payload: &str) -> Result<(), DeliveryError>;

  /// Close the connection.
  async fn close(&self) -> Result<(), DeliveryError>;
}
