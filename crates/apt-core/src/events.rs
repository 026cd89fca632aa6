// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

/// The vocabulary of structured log events emitted by the connection core
/// and device controllers. `tracing` events carry this as a `kind` field so
/// a JSON-formatting subscriber can group and alert on it; the core never
/// chooses a sink, that remains a caller concern.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Event {
    RxMessageKnown,
    RxMessageUnknown,
    TxMessageOrdered,
    TxMessageUnordered,
    UncaughtException,
    DeviceConnected,
    DeviceNotConnectedError,
    SwitchBarState,
    SwitchCrossState,
}

impl Event {
    pub const fn as_str(self) -> &'static str {
        match self {
            Event::RxMessageKnown => "RX_MESSAGE_KNOWN",
            Event::RxMessageUnknown => "RX_MESSAGE_UNKNOWN",
            Event::TxMessageOrdered => "TX_MESSAGE_ORDERED",
            Event::TxMessageUnordered => "TX_MESSAGE_UNORDERED",
            Event::UncaughtException => "UNCAUGHT_EXCEPTION",
            Event::DeviceConnected => "DEVICE_CONNECTED",
            Event::DeviceNotConnectedError => "DEVICE_NOT_CONNECTED_ERROR",
            Event::SwitchBarState => "SWITCH_BAR_STATE",
            Event::SwitchCrossState => "SWITCH_CROSS_STATE",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_vendor_names() {
        assert_eq!(Event::RxMessageKnown.as_str(), "RX_MESSAGE_KNOWN");
        assert_eq!(Event::DeviceNotConnectedError.to_string(), "DEVICE_NOT_CONNECTED_ERROR");
    }
}
