//! Bluetooth Low Energy session driver for the Mi Kettle Pro
//!
//! This crate drives the protocol defined in `kettle-core` over a GATT
//! connection: it logs in, polls status, enforces the boil cutoff and issues
//! commands.
//!
//! ## Architecture
//!
//! - [`link`] - Transport capability the session consumes
//! - [`btleplug_link`] - `btleplug` implementation of the link
//! - [`mailbox`] - Per-characteristic notification queues and signals
//! - [`writer`] - Frame writes with acknowledgement checks
//! - [`handshake`] - Mutual authentication sequence
//! - [`observer`] - Status and availability observers
//! - [`session`] - Connect sequence, status, safety and commands
//! - [`device`] - Serialized facade with the background poll loop
//! - [`error`] - Link error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kettle_ble::{BtleplugLink, KettleDevice, KettleSession};
//! use kettle_core::KettleConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = KettleConfig::load_from_file("kettle.toml")?;
//! let link = BtleplugLink::resolve(
//!     "AA:BB:CC:DD:EE:FF",
//!     &config.adapters,
//!     config.connection_timeout(),
//! )
//! .await?;
//!
//! let session = KettleSession::new(link, config)?.with_session_id("kitchen");
//! let mut device = KettleDevice::new(session);
//! device.register_status_observer(|status| {
//!     println!("{} at {}°C", status.action, status.current_temperature);
//!     Ok(())
//! });
//!
//! device.setup().await?;
//! device.start();
//! device.action("heat").await?;
//! device.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod btleplug_link;
pub mod device;
pub mod error;
pub mod handshake;
pub mod link;
pub mod mailbox;
pub mod observer;
pub mod session;
pub mod writer;

pub use btleplug_link::BtleplugLink;
pub use device::KettleDevice;
pub use error::LinkError;
pub use handshake::{Handshake, LoginOutcome};
pub use link::{DisconnectHandler, FrameHandler, KettleLink, ServiceInfo};
pub use mailbox::Mailbox;
pub use observer::{AvailabilityEvent, ObserverError, ObserverId, ObserverResult, Observers};
pub use session::{KettleSession, LinkState, SessionShared};
pub use writer::FrameWriter;
