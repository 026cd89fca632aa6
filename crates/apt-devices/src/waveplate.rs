// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use apt_core::{AptError, Connection, Result};
use apt_protocol::{Address, ChanIdent, EnableState, JogDirection, Message};
use tracing::debug;

use crate::quantity::Quantity;

/// Device steps per degree for the K10CR1 rotation stage (°/step ratio
/// 1/136533).
const STEPS_PER_DEGREE: f64 = 136_533.0;

fn degrees_to_steps(degrees: f64) -> i32 {
    (degrees * STEPS_PER_DEGREE).round() as i32
}

const DEST: Address = Address::GenericUsb;
const SRC: Address = Address::HostController;

/// The K10CR1's single motion channel.
const CHANNEL: ChanIdent = ChanIdent::CHANNEL_1;

/// A Thorlabs K10CR1 motorized rotation stage, driven over an already-open
/// [`Connection`].
///
/// Unlike [`crate::polarization::PolarizationController`], this device runs
/// no background poller: K10CR1 firmware keeps pushing unsolicited
/// `MOT_GET_USTATUSUPDATE` frames on its own once update messages are
/// started, so there is nothing here to poll for.
pub struct WaveplateController {
    connection: Arc<Connection>,
}

impl WaveplateController {
    /// Opens auto-push status updates on construction, mirroring the
    /// device's firmware-driven update model.
    pub fn new(connection: Arc<Connection>) -> Result<Self> {
        connection.send_no_reply(Message::HwStartUpdateMsgs {
            destination: DEST,
            source: SRC,
        })?;
        Ok(WaveplateController { connection })
    }

    fn set_channel_enabled(&self, enabled: bool) -> Result<()> {
        let chan_bitmask = if enabled { CHANNEL } else { ChanIdent::empty() };
        self.connection.send_no_reply(Message::ModSetChanEnableState {
            destination: DEST,
            source: SRC,
            chan_ident: chan_bitmask,
            enable_state: EnableState::Enabled,
        })
    }

    /// Read the current status.
    pub fn get_status(&self) -> Result<apt_protocol::DcStatusUpdate> {
        let request = Message::MotReqUStatusUpdate {
            destination: DEST,
            source: SRC,
            chan_ident: CHANNEL,
        };
        match self.connection.send_expect_reply(request, |m| {
            matches!(
                m,
                Message::MotGetUStatusUpdate { destination: Address::HostController, source: Address::GenericUsb, status }
                    if status.chan_ident == CHANNEL
            )
        })? {
            Message::MotGetUStatusUpdate { status, .. } => Ok(status),
            _ => unreachable!("matcher only accepts MotGetUStatusUpdate"),
        }
    }

    /// Home the stage: enable, send `MOVE_HOME`, wait for `MOVE_HOMED`,
    /// disable.
    pub fn home(&self) -> Result<()> {
        self.set_channel_enabled(true)?;
        let request = Message::MotMoveHome {
            destination: DEST,
            source: SRC,
            chan_ident: CHANNEL,
        };
        self.connection.send_expect_reply(request, |m| {
            matches!(
                m,
                Message::MotMoveHomed { destination: Address::HostController, source: Address::GenericUsb, chan_ident }
                    if *chan_ident == CHANNEL
            )
        })?;
        self.set_channel_enabled(false)
    }

    /// Jog the stage in small steps, sized by the device's own jog-step
    /// parameters.
    pub fn jog(&self, direction: JogDirection) -> Result<()> {
        self.set_channel_enabled(true)?;
        let request = Message::MotMoveJog {
            destination: DEST,
            source: SRC,
            chan_ident: CHANNEL,
            direction,
        };
        self.connection.send_expect_reply(request, |m| {
            matches!(
                m,
                Message::MotMoveCompleted { destination: Address::HostController, source: Address::GenericUsb, status }
                    if status.chan_ident == CHANNEL
            )
        })?;
        self.set_channel_enabled(false)
    }

    /// Move the stage to an absolute angle, in degrees.
    ///
    /// The K10CR1 has no fixed travel limit comparable to the MPC paddles'
    /// 170 degrees, so only dimensionality is validated here.
    pub fn move_absolute(&self, position: Quantity) -> Result<()> {
        let degrees = position
            .as_degrees()
            .ok_or_else(|| AptError::InvalidArgument("move_absolute expects an angle".into()))?;
        let steps = degrees_to_steps(degrees);

        self.set_channel_enabled(true)?;
        debug!(steps, "sending move_absolute");
        let request = Message::MotMoveAbsolute {
            destination: DEST,
            source: SRC,
            chan_ident: CHANNEL,
            absolute_distance: steps,
        };
        self.connection.send_expect_reply(request, move |m| {
            matches!(
                m,
                Message::MotMoveCompleted { destination: Address::HostController, source: Address::GenericUsb, status }
                    if status.chan_ident == CHANNEL && status.position == steps
            )
        })?;
        self.set_channel_enabled(false)
    }

    /// Stop any motion in progress, profiled (decelerating), and wait for
    /// the stage to confirm it has stopped.
    pub fn stop(&self) -> Result<()> {
        let request = Message::MotMoveStop {
            destination: DEST,
            source: SRC,
            chan_ident: CHANNEL,
            stop_mode: apt_protocol::StopMode::Profiled,
        };
        self.connection.send_expect_reply(request, |m| {
            matches!(
                m,
                Message::MotMoveStopped { destination: Address::HostController, source: Address::GenericUsb, status }
                    if status.chan_ident == CHANNEL
            )
        })?;
        Ok(())
    }
}

impl Drop for WaveplateController {
    fn drop(&mut self) {
        let _ = self.connection.send_no_reply(Message::HwStopUpdateMsgs {
            destination: DEST,
            source: SRC,
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn degrees_to_steps_matches_ratio() {
        assert_eq!(degrees_to_steps(1.0), 136_533);
        assert_eq!(degrees_to_steps(0.0), 0);
    }
}
