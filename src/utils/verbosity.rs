//! Message classes the block solver may report.

use bitflags::bitflags;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct MsgType: u32 {
        const ERRORS              = 0b0000_0001;
        const WARNINGS            = 0b0000_0010;
        const ITERATION_DETAILS   = 0b0000_0100;
        const ORTHO_DETAILS       = 0b0000_1000;
        const FINAL_SUMMARY       = 0b0001_0000;
        const TIMING_DETAILS      = 0b0010_0000;
        const STATUS_TEST_DETAILS = 0b0100_0000;
        const DEBUG               = 0b1000_0000;
        const QUIET               = Self::ERRORS.bits() | Self::WARNINGS.bits();
        const VERBOSE             = Self::QUIET.bits() | Self::ITERATION_DETAILS.bits()
                                  | Self::FINAL_SUMMARY.bits() | Self::TIMING_DETAILS.bits()
                                  | Self::STATUS_TEST_DETAILS.bits();
    }
}

impl Default for MsgType {
    fn default() -> Self {
        MsgType::QUIET | MsgType::FINAL_SUMMARY
    }
}

impl MsgType {
    /// Mask for the driver's `verbose` / `debug` switches.
    pub fn from_switches(verbose: bool, debug: bool) -> Self {
        let base = if verbose { MsgType::VERBOSE } else { MsgType::default() };
        if debug { base | MsgType::ORTHO_DETAILS | MsgType::DEBUG } else { base }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_adds_orthogonality_details() {
        let m = MsgType::from_switches(false, true);
        assert!(m.contains(MsgType::ORTHO_DETAILS | MsgType::ERRORS));
        assert!(!m.contains(MsgType::ITERATION_DETAILS));
        assert!(MsgType::from_switches(true, false).contains(MsgType::ITERATION_DETAILS));
    }
}
