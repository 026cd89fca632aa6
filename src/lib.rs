// SPDX-License-Identifier: GPL-3.0-or-later

//! Host-side driver for Thorlabs APT motorized optical instruments.
//!
//! This crate is a thin facade over three layers:
//!
//! - [`apt_protocol`]: the wire codec — message framing, the `Message`
//!   tagged union, and the small value types (`Address`, `ChanIdent`,
//!   `StatusBits`, ...) that appear in it.
//! - [`apt_core`]: the serial transport and the [`Connection`] that
//!   multiplexes it across concurrent callers.
//! - [`apt_devices`]: device controllers built on a `Connection` —
//!   [`PolarizationController`] for the MPC320/MPC220 paddles and
//!   [`WaveplateController`] for the K10CR1 rotation stage.
//!
//! A typical session opens one connection and hands it, wrapped in an
//! `Arc`, to one controller:
//!
//! ```no_run
//! use std::sync::Arc;
//! use thorlabs_apt::{Connection, PolarizationController};
//!
//! # fn main() -> thorlabs_apt::Result<()> {
//! let connection = Arc::new(Connection::new());
//! connection.open("/dev/ttyUSB0")?;
//! let mpc = PolarizationController::new_mpc320(connection);
//! let status = mpc.get_status_all()?;
//! # let _ = status;
//! # Ok(())
//! # }
//! ```

pub use apt_core::{with_deadline, AptError, Connection, Deadline, Event, Matcher, Result, SerialTransport, Subscription, Transport, DEFAULT_REPLY_TIMEOUT};
pub use apt_devices::{ParamsUpdate, PolarizationController, Quantity, WaveplateController};
pub use apt_protocol::{
    decode_header, Address, ChanIdent, DcStatusUpdate, EnableState, FirmwareVersion,
    HardwareInfo, HardwareType, HeaderPeek, JogDirection, Message, MoveCompleted, PolParams,
    StatusBits, StopMode, HEADER_LEN,
};
