//! [`KettleLink`] over a btleplug peripheral

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::LinkError;
use crate::link::{DisconnectHandler, FrameHandler, KettleLink, ServiceInfo};

// ----------------------------------------------------------------------------
// Link Implementation
// ----------------------------------------------------------------------------

/// GATT link to one kettle through a btleplug adapter
pub struct BtleplugLink {
    adapter: Adapter,
    peripheral: Peripheral,
    connection_timeout: Duration,
    handlers: Arc<Mutex<HashMap<Uuid, FrameHandler>>>,
    disconnect_handler: Arc<Mutex<Option<DisconnectHandler>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BtleplugLink {
    /// Wrap a peripheral the host has already discovered
    pub fn new(adapter: Adapter, peripheral: Peripheral, connection_timeout: Duration) -> Self {
        Self {
            adapter,
            peripheral,
            connection_timeout,
            handlers: Arc::new(Mutex::new(HashMap::new())),
            disconnect_handler: Arc::new(Mutex::new(None)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Find the device by address on the named adapters, in order
    ///
    /// An empty `adapters` list searches every adapter the system reports.
    /// Adapters are matched by the prefix of their info string (`hci0`, ...).
    pub async fn resolve(
        address: &str,
        adapters: &[String],
        connection_timeout: Duration,
    ) -> Result<Self, LinkError> {
        let target: BDAddr = address
            .parse()
            .map_err(|_| LinkError::InvalidAddress(address.to_string()))?;

        let manager = Manager::new().await?;
        let available = manager.adapters().await?;
        if available.is_empty() {
            return Err(LinkError::AdapterNotAvailable);
        }

        for adapter in order_adapters(available, adapters).await {
            for peripheral in adapter.peripherals().await? {
                if peripheral.address() == target {
                    info!(%address, "Resolved kettle on adapter");
                    return Ok(Self::new(adapter, peripheral, connection_timeout));
                }
            }
            debug!(%address, "Kettle not known to adapter, trying next");
        }

        Err(LinkError::DeviceNotFound {
            address: address.to_string(),
        })
    }

    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, LinkError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(LinkError::CharacteristicNotFound(uuid))
    }

    /// Spawn the notification pump and the disconnect watcher
    async fn start_background_tasks(&self) -> Result<(), LinkError> {
        self.stop_background_tasks();

        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| LinkError::NotificationStreamFailed(e.to_string()))?;
        let handlers = self.handlers.clone();
        let pump = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let handler = lock(&handlers).get(&notification.uuid).cloned();
                match handler {
                    Some(handler) => handler(notification.uuid, notification.value),
                    None => debug!(uuid = %notification.uuid, "Notification without handler"),
                }
            }
            debug!("Notification pump ended");
        });

        let mut events = self.adapter.events().await?;
        let peripheral_id = self.peripheral.id();
        let disconnect_handler = self.disconnect_handler.clone();
        let watcher = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    if id == peripheral_id {
                        info!("Kettle disconnected by transport");
                        let handler = lock(&disconnect_handler).clone();
                        if let Some(handler) = handler {
                            handler();
                        }
                        break;
                    }
                }
            }
        });

        lock(&self.tasks).extend([pump, watcher]);
        Ok(())
    }

    fn stop_background_tasks(&self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl KettleLink for BtleplugLink {
    async fn connect(&self) -> Result<(), LinkError> {
        match timeout(self.connection_timeout, self.peripheral.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(LinkError::ConnectionTimeout),
        }
        self.peripheral.discover_services().await?;
        self.start_background_tasks().await?;
        info!(address = %self.peripheral.address(), "Connected to kettle");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        self.stop_background_tasks();
        lock(&self.handlers).clear();
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        match self.peripheral.is_connected().await {
            Ok(connected) => connected,
            Err(e) => {
                warn!("Failed to query connection state: {}", e);
                false
            }
        }
    }

    async fn local_name(&self) -> Result<Option<String>, LinkError> {
        Ok(self
            .peripheral
            .properties()
            .await?
            .and_then(|properties| properties.local_name))
    }

    async fn services(&self) -> Result<Vec<ServiceInfo>, LinkError> {
        Ok(self
            .peripheral
            .services()
            .into_iter()
            .map(|service| ServiceInfo {
                uuid: service.uuid,
                characteristics: service.characteristics.iter().map(|c| c.uuid).collect(),
            })
            .collect())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, LinkError> {
        let target = self.characteristic(characteristic)?;
        Ok(self.peripheral.read(&target).await?)
    }

    async fn write(
        &self,
        characteristic: Uuid,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), LinkError> {
        let target = self.characteristic(characteristic)?;
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        Ok(self.peripheral.write(&target, data, write_type).await?)
    }

    async fn subscribe(
        &self,
        characteristic: Uuid,
        handler: FrameHandler,
    ) -> Result<(), LinkError> {
        let target = self.characteristic(characteristic)?;
        lock(&self.handlers).insert(characteristic, handler);
        self.peripheral.subscribe(&target).await?;
        Ok(())
    }

    fn set_disconnect_handler(&self, handler: DisconnectHandler) {
        *lock(&self.disconnect_handler) = Some(handler);
    }
}

impl Drop for BtleplugLink {
    fn drop(&mut self) {
        self.stop_background_tasks();
    }
}

/// Adapters in the configured order, or all of them when none are named
async fn order_adapters(available: Vec<Adapter>, names: &[String]) -> Vec<Adapter> {
    if names.is_empty() {
        return available;
    }

    let mut described = Vec::with_capacity(available.len());
    for adapter in available {
        let info = adapter.adapter_info().await.unwrap_or_default();
        described.push((info, adapter));
    }

    let mut ordered = Vec::new();
    for name in names {
        match described.iter().find(|(info, _)| info.starts_with(name.as_str())) {
            Some((_, adapter)) => ordered.push(adapter.clone()),
            None => warn!(adapter = %name, "Configured BLE adapter not present"),
        }
    }
    ordered
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
