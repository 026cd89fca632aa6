// SPDX-License-Identifier: GPL-3.0-or-later

//! Device controllers built on top of [`apt_core::Connection`].
//!
//! Each controller owns no serial state of its own; callers open a
//! [`apt_core::Connection`], wrap it in an `Arc`, and hand it to one or more
//! controllers here. Two device families are supported: the MPC320/MPC220
//! motorized polarization-controller paddles ([`PolarizationController`])
//! and the K10CR1 rotation stage ([`WaveplateController`]).

pub mod polarization;
pub mod quantity;
pub mod waveplate;

pub use polarization::{ParamsUpdate, PolarizationController};
pub use quantity::Quantity;
pub use waveplate::WaveplateController;
