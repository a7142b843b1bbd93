//! Transport capability consumed by the session
//!
//! A [`KettleLink`] is one GATT connection to one kettle. The session owns
//! the protocol; the link only moves bytes and reports disconnects.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::LinkError;

/// Callback receiving `(characteristic, frame)` for every notification
pub type FrameHandler = Arc<dyn Fn(Uuid, Vec<u8>) + Send + Sync>;

/// Callback fired when the transport loses the connection on its own
pub type DisconnectHandler = Arc<dyn Fn() + Send + Sync>;

/// A discovered GATT service and its characteristics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

/// GATT operations needed to drive a kettle session
#[async_trait]
pub trait KettleLink: Send + Sync {
    /// Open the connection and discover services
    async fn connect(&self) -> Result<(), LinkError>;

    /// Close the connection; a no-op when already closed
    async fn disconnect(&self) -> Result<(), LinkError>;

    async fn is_connected(&self) -> bool;

    /// Advertised device name, when the transport knows it
    async fn local_name(&self) -> Result<Option<String>, LinkError>;

    /// Services discovered on the connected device
    async fn services(&self) -> Result<Vec<ServiceInfo>, LinkError>;

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, LinkError>;

    async fn write(
        &self,
        characteristic: Uuid,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), LinkError>;

    /// Enable notifications on `characteristic`, delivering frames to `handler`
    async fn subscribe(&self, characteristic: Uuid, handler: FrameHandler)
        -> Result<(), LinkError>;

    /// Install the callback for transport-initiated disconnects
    fn set_disconnect_handler(&self, handler: DisconnectHandler);
}
