//! Counters for conditions the ISR recovers from on its own.

/// Snapshot of the engine's health counters.
///
/// All counters wrap. None of these conditions stop motion: they are the
/// engine's record of what it had to degrade or drop to keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    /// ISR calls that ran past their deadline and were rescheduled.
    pub overruns: u32,
    /// Overruns that happened with multistepping already at its ceiling.
    pub lost_step_risk: u32,
    /// Pin writes that failed inside the ISR.
    pub pin_faults: u32,
    /// Times pulses per ISR call were doubled.
    pub multistep_escalations: u32,
    /// Times pulses per ISR call were halved.
    pub multistep_deescalations: u32,
    /// Blocks dropped by an abort request.
    pub aborted_blocks: u32,
    /// Echoes lost because a shaping queue was full.
    pub dropped_echoes: u32,
    /// Pulses issued per ISR call right now.
    pub steps_per_isr: u32,
    /// Oversampling shift of the running block.
    pub oversampling: u8,
}

impl Diagnostics {
    /// Whether anything went wrong since the counters were last cleared.
    pub fn has_faults(&self) -> bool {
        self.overruns != 0
            || self.lost_step_risk != 0
            || self.pin_faults != 0
            || self.dropped_echoes != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_summary() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.steps_per_isr = 4;
        diagnostics.multistep_escalations = 2;
        assert!(!diagnostics.has_faults());

        diagnostics.pin_faults = 1;
        assert!(diagnostics.has_faults());
    }
}
