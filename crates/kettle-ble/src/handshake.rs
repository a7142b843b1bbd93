//! Login handshake driver
//!
//! Runs the mutual authentication over the auth-init and auth
//! characteristics. Every expected acknowledgement that fails to show up
//! aborts the attempt with [`HandshakeError::ProtocolMismatch`].

use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use kettle_core::{
    reassemble_fragments, AuthContext, HandshakeError, KettleError, Result, ACK_READY,
    ACK_SUCCESS, AUTH_INIT_UUID, AUTH_UUID, OP_ALREADY_LOGIN, OP_AUTH_INIT_1, OP_AUTH_INIT_2,
    OP_DEV_PREPARE_RAND, OP_DEV_PREPARE_TOKEN, OP_PREPARE_RAND, OP_PREPARE_TOKEN, OP_SUCCESS,
};

use crate::link::KettleLink;
use crate::writer::FrameWriter;

/// Extra wait while the device streams its token fragments
pub const TOKEN_FRAGMENT_WAIT: Duration = Duration::from_millis(500);

/// How the device accepted the login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Full random and token exchange completed
    Exchanged,
    /// Device reported an existing login
    AlreadyLoggedIn,
}

/// One login attempt over a connected, subscribed link
pub struct Handshake<'a, L: ?Sized> {
    writer: FrameWriter<'a, L>,
    auth: &'a mut AuthContext,
}

impl<'a, L: KettleLink + ?Sized> Handshake<'a, L> {
    pub fn new(writer: FrameWriter<'a, L>, auth: &'a mut AuthContext) -> Self {
        Self { writer, auth }
    }

    pub async fn run(mut self) -> Result<LoginOutcome> {
        debug!("Login: init sequence");
        self.writer.send(AUTH_INIT_UUID, OP_AUTH_INIT_1).await?;
        self.writer.send(AUTH_INIT_UUID, OP_AUTH_INIT_2).await?;

        let init = self.drain(AUTH_INIT_UUID, Duration::ZERO).await;
        if contains(&init, OP_ALREADY_LOGIN) {
            info!("Device reports an existing login");
            return Ok(LoginOutcome::AlreadyLoggedIn);
        }

        self.exchange_random().await?;
        self.exchange_tokens().await?;
        info!("Login handshake completed");
        Ok(LoginOutcome::Exchanged)
    }

    async fn exchange_random(&mut self) -> Result<()> {
        debug!("Login: announce app random");
        self.expect_ack(AUTH_UUID, OP_PREPARE_RAND, ACK_READY, false).await?;
        let tagged = self.auth.tagged_app_random();
        self.writer
            .write_secret(AUTH_UUID, &tagged, Some(ACK_SUCCESS), true)
            .await
            .map_err(into_mismatch)?;

        debug!("Login: wait for device random");
        self.expect_frame(AUTH_UUID, OP_DEV_PREPARE_RAND).await?;
        self.writer.send(AUTH_UUID, ACK_READY).await?;
        let fragments = self.drain(AUTH_UUID, Duration::ZERO).await;
        let dev_random = reassemble_fragments(&fragments);
        if dev_random.is_empty() {
            return Err(HandshakeError::MissingRandom.into());
        }
        self.writer.send(AUTH_UUID, ACK_SUCCESS).await?;

        self.auth.record_device_random(dev_random)?;
        debug!("Login: session keys derived");
        Ok(())
    }

    async fn exchange_tokens(&mut self) -> Result<()> {
        debug!("Login: wait for device token");
        self.expect_frame(AUTH_UUID, OP_DEV_PREPARE_TOKEN).await?;
        self.writer.send(AUTH_UUID, ACK_READY).await?;
        let fragments = self.drain(AUTH_UUID, TOKEN_FRAGMENT_WAIT).await;
        self.auth.verify_device_token(&reassemble_fragments(&fragments))?;
        self.writer.send(AUTH_UUID, ACK_SUCCESS).await?;

        debug!("Login: send app token");
        self.expect_ack(AUTH_UUID, OP_PREPARE_TOKEN, ACK_READY, true).await?;
        let [first, second] = self.auth.app_token_fragments()?;
        self.writer.send_secret(AUTH_UUID, &first).await?;
        self.writer
            .write_secret(AUTH_UUID, &second, Some(ACK_SUCCESS), false)
            .await
            .map_err(into_mismatch)?;

        self.expect_frame(AUTH_INIT_UUID, OP_SUCCESS).await
    }

    async fn expect_ack(
        &self,
        characteristic: Uuid,
        payload: &[u8],
        ack: &[u8],
        single: bool,
    ) -> Result<()> {
        self.writer
            .write(characteristic, payload, Some(ack), single)
            .await
            .map_err(into_mismatch)
    }

    /// Drain and require a frame the device sends unprompted
    async fn expect_frame(&self, characteristic: Uuid, expected: &[u8]) -> Result<()> {
        let frames = self.drain(characteristic, Duration::ZERO).await;
        if contains(&frames, expected) {
            Ok(())
        } else {
            Err(HandshakeError::mismatch(characteristic, expected, &frames).into())
        }
    }

    async fn drain(&self, characteristic: Uuid, extra: Duration) -> Vec<Vec<u8>> {
        self.writer
            .mailbox()
            .wait_and_drain(characteristic, extra, false)
            .await
    }
}

fn contains(frames: &[Vec<u8>], expected: &[u8]) -> bool {
    frames.iter().any(|frame| frame.as_slice() == expected)
}

/// Acknowledgement failures during login are protocol violations
fn into_mismatch(err: KettleError) -> KettleError {
    match err {
        KettleError::UnexpectedResponse {
            characteristic,
            expected,
            received,
        } => HandshakeError::ProtocolMismatch {
            characteristic,
            expected,
            actual: received,
        }
        .into(),
        other => other,
    }
}
