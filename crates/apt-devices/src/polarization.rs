// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use apt_core::{AptError, Connection, Result};
use apt_protocol::{Address, ChanIdent, DcStatusUpdate, EnableState, JogDirection, Message, PolParams};
use tracing::debug;

use crate::quantity::Quantity;

/// Degrees per device step for the MPC320/MPC220 paddle family.
const DEGREES_PER_STEP: f64 = 170.0 / 1370.0;

fn degrees_to_steps(degrees: f64) -> i32 {
    (degrees / DEGREES_PER_STEP).round() as i32
}

const DEST: Address = Address::GenericUsb;
const SRC: Address = Address::HostController;

/// Optional overrides for [`PolarizationController::set_params`]. Any field
/// left `None` keeps the device's current value.
#[derive(Debug, Default, Copy, Clone)]
pub struct ParamsUpdate {
    /// Percent of 400 deg/s, clamped to 10..=100 on write.
    pub velocity: Option<u16>,
    pub home_position: Option<u16>,
    pub jog_step_1: Option<u16>,
    pub jog_step_2: Option<u16>,
    pub jog_step_3: Option<u16>,
}

/// A Thorlabs MPC320 or MPC220 motorized polarization-controller paddle,
/// driven over an already-open [`Connection`].
///
/// Owns a polling worker that keeps the device's USTATUS auto-push alive
/// for every available channel; the worker is joined on drop.
pub struct PolarizationController {
    connection: Arc<Connection>,
    available_channels: Vec<ChanIdent>,
    poller_stop: Arc<AtomicBool>,
    poller: Option<JoinHandle<()>>,
}

impl PolarizationController {
    /// MPC320: three paddle channels.
    pub fn new_mpc320(connection: Arc<Connection>) -> Self {
        Self::new(
            connection,
            vec![ChanIdent::CHANNEL_1, ChanIdent::CHANNEL_2, ChanIdent::CHANNEL_3],
        )
    }

    /// MPC220: two paddle channels.
    pub fn new_mpc220(connection: Arc<Connection>) -> Self {
        Self::new(connection, vec![ChanIdent::CHANNEL_1, ChanIdent::CHANNEL_2])
    }

    fn new(connection: Arc<Connection>, available_channels: Vec<ChanIdent>) -> Self {
        let poller_stop = Arc::new(AtomicBool::new(false));
        let poller = {
            let connection = Arc::clone(&connection);
            let stop = Arc::clone(&poller_stop);
            let channels = available_channels.clone();
            thread::spawn(move || tx_poll(connection, channels, stop))
        };
        PolarizationController {
            connection,
            available_channels,
            poller_stop,
            poller: Some(poller),
        }
    }

    pub fn available_channels(&self) -> &[ChanIdent] {
        &self.available_channels
    }

    /// Read the current status of one channel.
    pub fn get_status(&self, chan: ChanIdent) -> Result<DcStatusUpdate> {
        let request = Message::MotReqUStatusUpdate {
            destination: DEST,
            source: SRC,
            chan_ident: chan,
        };
        let reply = self.connection.send_expect_reply(request, move |m| {
            matches!(
                m,
                Message::MotGetUStatusUpdate { destination: Address::HostController, source: Address::GenericUsb, status }
                    if status.chan_ident == chan
            )
        })?;
        match reply {
            Message::MotGetUStatusUpdate { status, .. } => Ok(status),
            _ => unreachable!("matcher only accepts MotGetUStatusUpdate"),
        }
    }

    /// Read the current status of every available channel, in channel order.
    pub fn get_status_all(&self) -> Result<Vec<DcStatusUpdate>> {
        self.available_channels
            .iter()
            .map(|&chan| self.get_status(chan))
            .collect()
    }

    fn set_channel_enabled(&self, chan: ChanIdent, enabled: bool) -> Result<()> {
        let chan_bitmask = if enabled { chan } else { ChanIdent::empty() };
        let request = Message::ModSetChanEnableState {
            destination: DEST,
            source: SRC,
            chan_ident: chan_bitmask,
            enable_state: EnableState::Enabled,
        };
        self.connection.send_expect_reply(request, move |m| {
            matches!(
                m,
                Message::MotGetUStatusUpdate { destination: Address::HostController, source: Address::GenericUsb, status }
                    if status.chan_ident == chan && status.status.contains(apt_protocol::StatusBits::ENABLED) == enabled
            )
        })?;
        Ok(())
    }

    /// Home one channel: enable, send `MOVE_HOME`, wait for `MOVE_HOMED`,
    /// disable.
    pub fn home(&self, chan: ChanIdent) -> Result<()> {
        self.set_channel_enabled(chan, true)?;
        let request = Message::MotMoveHome {
            destination: DEST,
            source: SRC,
            chan_ident: chan,
        };
        self.connection.send_expect_reply(request, move |m| {
            matches!(
                m,
                Message::MotMoveHomed { destination: Address::HostController, source: Address::GenericUsb, chan_ident }
                    if *chan_ident == chan
            )
        })?;
        self.set_channel_enabled(chan, false)
    }

    /// Flash the device's identification LED. Fire-and-forget.
    pub fn identify(&self, chan: ChanIdent) -> Result<()> {
        self.connection.send_no_reply(Message::ModIdentify {
            destination: DEST,
            source: SRC,
            chan_ident: chan,
        })
    }

    /// Jog one channel in small steps, sized by `set_params`'s `jog_step_*`.
    pub fn jog(&self, chan: ChanIdent, direction: JogDirection) -> Result<()> {
        self.set_channel_enabled(chan, true)?;
        let request = Message::MotMoveJog {
            destination: DEST,
            source: SRC,
            chan_ident: chan,
            direction,
        };
        self.connection.send_expect_reply(request, move |m| {
            matches!(
                m,
                Message::MotMoveCompletedNoData { destination: Address::HostController, source: Address::GenericUsb, chan_ident }
                    if *chan_ident == chan
            )
        })?;
        self.set_channel_enabled(chan, false)
    }

    /// Move one channel to an absolute angle in `[0, 170]` degrees.
    pub fn move_absolute(&self, chan: ChanIdent, position: Quantity) -> Result<()> {
        let degrees = position
            .as_degrees()
            .ok_or_else(|| AptError::InvalidArgument("move_absolute expects an angle".into()))?;
        if !(0.0..=170.0).contains(&degrees) {
            return Err(AptError::InvalidArgument(format!(
                "absolute position must be between 0 and 170 degrees, got {degrees}"
            )));
        }
        let steps = degrees_to_steps(degrees);

        self.set_channel_enabled(chan, true)?;
        debug!(?chan, steps, "sending move_absolute");
        let request = Message::MotMoveAbsolute {
            destination: DEST,
            source: SRC,
            chan_ident: chan,
            absolute_distance: steps,
        };
        self.connection.send_expect_reply(request, move |m| {
            matches!(
                m,
                Message::MotGetUStatusUpdate { destination: Address::HostController, source: Address::GenericUsb, status }
                    if status.chan_ident == chan && status.position == steps
            )
        })?;
        self.set_channel_enabled(chan, false)
    }

    /// Read the device-wide motion parameters.
    pub fn get_params(&self) -> Result<PolParams> {
        let request = Message::PolReqParams {
            destination: DEST,
            source: SRC,
        };
        match self
            .connection
            .send_expect_reply(request, |m| matches!(m, Message::PolGetParams { .. }))?
        {
            Message::PolGetParams { params, .. } => Ok(params),
            _ => unreachable!("matcher only accepts PolGetParams"),
        }
    }

    /// Read-modify-write the device-wide motion parameters. Fields left
    /// `None` in `update` keep their current value.
    pub fn set_params(&self, update: ParamsUpdate) -> Result<()> {
        let mut params = self.get_params()?;
        if let Some(velocity) = update.velocity {
            params.velocity = velocity.clamp(10, 100);
        }
        if let Some(home_position) = update.home_position {
            params.home_position = home_position;
        }
        if let Some(jog_step_1) = update.jog_step_1 {
            params.jog_step_1 = jog_step_1;
        }
        if let Some(jog_step_2) = update.jog_step_2 {
            params.jog_step_2 = jog_step_2;
        }
        if let Some(jog_step_3) = update.jog_step_3 {
            params.jog_step_3 = jog_step_3;
        }
        self.connection.send_no_reply(Message::PolSetParams {
            destination: DEST,
            source: SRC,
            params,
        })
    }
}

impl Drop for PolarizationController {
    fn drop(&mut self) {
        self.poller_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.poller.take() {
            let _ = handle.join();
        }
    }
}

fn tx_poll(connection: Arc<Connection>, channels: Vec<ChanIdent>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        for &chan in &channels {
            let request = Message::MotReqUStatusUpdate {
                destination: DEST,
                source: SRC,
                chan_ident: chan,
            };
            if connection.send_unordered(request).is_err() {
                return;
            }
        }
        let ack = Message::MotAckUStatusUpdate {
            destination: DEST,
            source: SRC,
        };
        if connection.send_unordered(ack).is_err() {
            return;
        }

        // Tight cadence while a reply-expecting call is outstanding, so
        // state changes surface quickly; relaxed cadence otherwise to keep
        // the log quiet. MGMSG_MOT_ACK_USTATUSUPDATE must be sent at least
        // once a second to keep the device's auto-push channel alive.
        if connection.is_awaiting_reply() {
            thread::sleep(Duration::from_millis(200));
        } else {
            connection.wait_for_awaiting_reply(Duration::from_secs(1));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn degrees_to_steps_matches_ratio() {
        assert_eq!(degrees_to_steps(0.0), 0);
        assert_eq!(degrees_to_steps(170.0), 1370);
    }
}
