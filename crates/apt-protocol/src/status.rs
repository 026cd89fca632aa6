// SPDX-License-Identifier: GPL-3.0-or-later

bitflags::bitflags! {
    /// The 32-bit status word carried in a `GET_USTATUSUPDATE` payload.
    ///
    /// Bit order is fixed by the wire format: bit 0 is `CWHARDLIMIT`, bit 31
    /// is `ENABLED`, and every bit in between follows the order below with
    /// no gaps.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct StatusBits: u32 {
        const CWHARDLIMIT       = 1 << 0;
        const CCWHARDLIMIT      = 1 << 1;
        const CWSOFTLIMIT       = 1 << 2;
        const CCWSOFTLIMIT      = 1 << 3;
        const INMOTIONCW        = 1 << 4;
        const INMOTIONCCW       = 1 << 5;
        const JOGGINGCW         = 1 << 6;
        const JOGGINGCCW        = 1 << 7;
        const CONNECTED         = 1 << 8;
        const HOMING            = 1 << 9;
        const HOMED             = 1 << 10;
        const INITIALIZING      = 1 << 11;
        const TRACKING          = 1 << 12;
        const SETTLED           = 1 << 13;
        const POSITIONERROR     = 1 << 14;
        const INSTRERROR        = 1 << 15;
        const INTERLOCK         = 1 << 16;
        const OVERTEMP          = 1 << 17;
        const BUSVOLTFAULT      = 1 << 18;
        const COMMUTATIONERROR  = 1 << 19;
        const DIGIP1            = 1 << 20;
        const DIGIP2            = 1 << 21;
        const DIGIP3            = 1 << 22;
        const DIGIP4            = 1 << 23;
        const OVERLOAD          = 1 << 24;
        const ENCODERFAULT      = 1 << 25;
        const OVERCURRENT       = 1 << 26;
        const BUSCURRENTFAULT   = 1 << 27;
        const POWEROK           = 1 << 28;
        const ACTIVE            = 1 << 29;
        const ERROR             = 1 << 30;
        const ENABLED           = 1 << 31;
    }
}

/// A human-readable, field-by-field view of [`StatusBits`], for structured
/// logging. Every field mirrors one flag.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StatusRecord {
    pub cw_hard_limit: bool,
    pub ccw_hard_limit: bool,
    pub cw_soft_limit: bool,
    pub ccw_soft_limit: bool,
    pub in_motion_cw: bool,
    pub in_motion_ccw: bool,
    pub jogging_cw: bool,
    pub jogging_ccw: bool,
    pub connected: bool,
    pub homing: bool,
    pub homed: bool,
    pub initializing: bool,
    pub tracking: bool,
    pub settled: bool,
    pub position_error: bool,
    pub instr_error: bool,
    pub interlock: bool,
    pub overtemp: bool,
    pub bus_volt_fault: bool,
    pub commutation_error: bool,
    pub digip1: bool,
    pub digip2: bool,
    pub digip3: bool,
    pub digip4: bool,
    pub overload: bool,
    pub encoder_fault: bool,
    pub overcurrent: bool,
    pub bus_current_fault: bool,
    pub power_ok: bool,
    pub active: bool,
    pub error: bool,
    pub enabled: bool,
}

impl From<StatusBits> for StatusRecord {
    fn from(bits: StatusBits) -> Self {
        StatusRecord {
            cw_hard_limit: bits.contains(StatusBits::CWHARDLIMIT),
            ccw_hard_limit: bits.contains(StatusBits::CCWHARDLIMIT),
            cw_soft_limit: bits.contains(StatusBits::CWSOFTLIMIT),
            ccw_soft_limit: bits.contains(StatusBits::CCWSOFTLIMIT),
            in_motion_cw: bits.contains(StatusBits::INMOTIONCW),
            in_motion_ccw: bits.contains(StatusBits::INMOTIONCCW),
            jogging_cw: bits.contains(StatusBits::JOGGINGCW),
            jogging_ccw: bits.contains(StatusBits::JOGGINGCCW),
            connected: bits.contains(StatusBits::CONNECTED),
            homing: bits.contains(StatusBits::HOMING),
            homed: bits.contains(StatusBits::HOMED),
            initializing: bits.contains(StatusBits::INITIALIZING),
            tracking: bits.contains(StatusBits::TRACKING),
            settled: bits.contains(StatusBits::SETTLED),
            position_error: bits.contains(StatusBits::POSITIONERROR),
            instr_error: bits.contains(StatusBits::INSTRERROR),
            interlock: bits.contains(StatusBits::INTERLOCK),
            overtemp: bits.contains(StatusBits::OVERTEMP),
            bus_volt_fault: bits.contains(StatusBits::BUSVOLTFAULT),
            commutation_error: bits.contains(StatusBits::COMMUTATIONERROR),
            digip1: bits.contains(StatusBits::DIGIP1),
            digip2: bits.contains(StatusBits::DIGIP2),
            digip3: bits.contains(StatusBits::DIGIP3),
            digip4: bits.contains(StatusBits::DIGIP4),
            overload: bits.contains(StatusBits::OVERLOAD),
            encoder_fault: bits.contains(StatusBits::ENCODERFAULT),
            overcurrent: bits.contains(StatusBits::OVERCURRENT),
            bus_current_fault: bits.contains(StatusBits::BUSCURRENTFAULT),
            power_ok: bits.contains(StatusBits::POWEROK),
            active: bits.contains(StatusBits::ACTIVE),
            error: bits.contains(StatusBits::ERROR),
            enabled: bits.contains(StatusBits::ENABLED),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_scenario_3_status_word() {
        // From the byte-vector test scenario: status_flags = 0x00000007.
        let bits = StatusBits::from_bits_truncate(0x0000_0007);
        assert_eq!(
            bits,
            StatusBits::CWHARDLIMIT | StatusBits::CCWHARDLIMIT | StatusBits::CWSOFTLIMIT
        );
        let record = StatusRecord::from(bits);
        assert!(record.cw_hard_limit);
        assert!(record.ccw_hard_limit);
        assert!(record.cw_soft_limit);
        assert!(!record.ccw_soft_limit);
        assert!(!record.enabled);
    }

    #[test]
    fn enabled_is_the_top_bit() {
        assert_eq!(StatusBits::ENABLED.bits(), 1 << 31);
        assert_eq!(StatusBits::CWHARDLIMIT.bits(), 1);
    }
}
