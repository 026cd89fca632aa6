// SPDX-License-Identifier: GPL-3.0-or-later

//! Serial transport and connection core for the Thorlabs APT protocol.
//!
//! A [`Connection`] owns one open serial port and the two long-lived
//! workers that multiplex it: an RX dispatcher fanning frames out to
//! subscribers, and a TX ordered sender draining a FIFO of queued writes.
//! Device controllers (in `apt-devices`) compose [`Connection::send_no_reply`],
//! [`Connection::send_expect_reply`], and [`Connection::send_unordered`] into
//! domain operations; this crate knows nothing about angles, steps, or
//! specific device families.

pub mod connection;
pub mod error;
pub mod events;
pub mod timeout;
pub mod transport;

pub use connection::{Connection, Matcher, Subscription};
pub use error::{AptError, Result};
pub use events::Event;
pub use timeout::{with_deadline, Deadline, DEFAULT_REPLY_TIMEOUT};
pub use transport::{SerialTransport, Transport};
