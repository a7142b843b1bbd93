//! Command issuance with optional acknowledgement check

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error};
use uuid::Uuid;

use kettle_core::{characteristic_name, KettleError, Result};

use crate::link::KettleLink;
use crate::mailbox::Mailbox;

/// Device processing latency after every write
pub const WRITE_SETTLE: Duration = Duration::from_millis(50);
/// Extra wait for trailing acknowledgement frames
pub const ACK_EXTRA_WAIT: Duration = Duration::from_secs(1);

/// Writes frames and checks the acknowledgements they provoke
pub struct FrameWriter<'a, L: ?Sized> {
    link: &'a L,
    mailbox: &'a Mailbox,
}

impl<'a, L: KettleLink + ?Sized> FrameWriter<'a, L> {
    pub fn new(link: &'a L, mailbox: &'a Mailbox) -> Self {
        Self { link, mailbox }
    }

    pub fn mailbox(&self) -> &'a Mailbox {
        self.mailbox
    }

    /// Write without response and let the device settle
    pub async fn send(&self, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        self.link.write(characteristic, payload, false).await?;
        sleep(WRITE_SETTLE).await;
        debug!(
            characteristic = characteristic_name(&characteristic),
            payload = %hex::encode(payload),
            "Frame written"
        );
        Ok(())
    }

    /// Write a frame carrying key material; only its length is logged
    pub async fn send_secret(&self, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        self.link.write(characteristic, payload, false).await?;
        sleep(WRITE_SETTLE).await;
        debug!(
            characteristic = characteristic_name(&characteristic),
            len = payload.len(),
            "Tagged fragment written"
        );
        Ok(())
    }

    /// Write `payload`, then require `ack` among the frames drained afterwards
    ///
    /// With `single`, only the first queued frame is consumed and later frames
    /// stay queued for the next step.
    pub async fn write(
        &self,
        characteristic: Uuid,
        payload: &[u8],
        ack: Option<&[u8]>,
        single: bool,
    ) -> Result<()> {
        self.send(characteristic, payload).await?;
        match ack {
            Some(ack) => self.expect_ack(characteristic, ack, single).await,
            None => Ok(()),
        }
    }

    /// Like [`FrameWriter::write`] for a payload carrying key material
    pub async fn write_secret(
        &self,
        characteristic: Uuid,
        payload: &[u8],
        ack: Option<&[u8]>,
        single: bool,
    ) -> Result<()> {
        self.send_secret(characteristic, payload).await?;
        match ack {
            Some(ack) => self.expect_ack(characteristic, ack, single).await,
            None => Ok(()),
        }
    }

    async fn expect_ack(&self, characteristic: Uuid, ack: &[u8], single: bool) -> Result<()> {
        let frames = self
            .mailbox
            .wait_and_drain(characteristic, ACK_EXTRA_WAIT, single)
            .await;
        if frames.iter().any(|frame| frame.as_slice() == ack) {
            debug!(
                characteristic = characteristic_name(&characteristic),
                ack = %hex::encode(ack),
                "Acknowledged"
            );
            return Ok(());
        }

        let err = KettleError::unexpected_response(characteristic, ack, &frames);
        error!("{}", err);
        Err(err)
    }
}
