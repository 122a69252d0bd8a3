//! Tracker State Machines
//!
//! Defines the duty-cycle phases a tracker moves through on every wake-up and
//! the connection states of the cloud link.

/// Phases of one duty cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Waiting for the cycle timer
    Idle,
    /// GPS receiver running, bounded by the GPS timeout
    GpsSearch,
    /// Sending snapshots and flushing buffered fixes
    CloudCycle,
    /// Cycle finished, waiting out the period
    Sleeping,
}

/// Events that drive the duty cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    /// Cycle timer expired. `motion` is whether motion was latched since the
    /// previous tick.
    TimerFired { active: bool, motion: bool },
    /// GPS search ended, with or without a fix
    GpsSearchEnded { fix: bool },
    /// Cloud cycle submitted
    CloudCycleDone,
    /// Sleep finished
    Woke,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(CyclePhase),
    /// Passive mode without motion: the cycle was skipped
    Skipped,
    /// Transition was invalid from current state
    Invalid { from: CyclePhase, event: CycleEvent },
}

/// The duty-cycle state machine
#[derive(Debug)]
pub struct DutyCycleMachine {
    phase: CyclePhase,
    cycles: u64,
    skipped: u64,
}

impl Default for DutyCycleMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DutyCycleMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self {
            phase: CyclePhase::Idle,
            cycles: 0,
            skipped: 0,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Number of cycles that reached the cloud phase
    pub fn completed_cycles(&self) -> u64 {
        self.cycles
    }

    /// Number of ticks skipped for lack of motion
    pub fn skipped_cycles(&self) -> u64 {
        self.skipped
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: CycleEvent) -> TransitionResult {
        use CycleEvent::*;
        use CyclePhase::*;

        let next = match (self.phase, &event) {
            (Idle, TimerFired { active, motion }) => {
                if !*active && !*motion {
                    self.skipped += 1;
                    self.phase = Sleeping;
                    return TransitionResult::Skipped;
                }
                Some(GpsSearch)
            }
            // Location is captured before it can be reported
            (GpsSearch, GpsSearchEnded { .. }) => Some(CloudCycle),
            (CloudCycle, CloudCycleDone) => {
                self.cycles += 1;
                Some(Sleeping)
            }
            (Sleeping, Woke) => Some(Idle),
            _ => None,
        };

        match next {
            Some(phase) => {
                self.phase = phase;
                TransitionResult::Success(phase)
            }
            None => TransitionResult::Invalid {
                from: self.phase,
                event,
            },
        }
    }
}

/// Connection state of the cloud transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "DISCONNECTED"),
            LinkState::Connecting => write!(f, "CONNECTING"),
            LinkState::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// Check if a link transition is valid
pub fn is_valid_link_transition(from: LinkState, to: LinkState) -> bool {
    use LinkState::*;

    match (from, to) {
        (a, b) if a == b => true,
        (Disconnected, Connecting) => true,
        (Connecting, Connected) => true,
        // Connect failure, error, hang-up or timeout
        (Connecting | Connected, Disconnected) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let fsm = DutyCycleMachine::new();
        assert_eq!(fsm.phase(), CyclePhase::Idle);
    }

    #[test]
    fn test_active_cycle_flow() {
        let mut fsm = DutyCycleMachine::new();

        let result = fsm.process_event(CycleEvent::TimerFired {
            active: true,
            motion: false,
        });
        assert_eq!(result, TransitionResult::Success(CyclePhase::GpsSearch));

        let result = fsm.process_event(CycleEvent::GpsSearchEnded { fix: false });
        assert_eq!(result, TransitionResult::Success(CyclePhase::CloudCycle));

        let result = fsm.process_event(CycleEvent::CloudCycleDone);
        assert_eq!(result, TransitionResult::Success(CyclePhase::Sleeping));

        let result = fsm.process_event(CycleEvent::Woke);
        assert_eq!(result, TransitionResult::Success(CyclePhase::Idle));
        assert_eq!(fsm.completed_cycles(), 1);
    }

    #[test]
    fn test_passive_without_motion_skips() {
        let mut fsm = DutyCycleMachine::new();

        let result = fsm.process_event(CycleEvent::TimerFired {
            active: false,
            motion: false,
        });
        assert_eq!(result, TransitionResult::Skipped);
        assert_eq!(fsm.phase(), CyclePhase::Sleeping);
        assert_eq!(fsm.skipped_cycles(), 1);
        assert_eq!(fsm.completed_cycles(), 0);
    }

    #[test]
    fn test_passive_with_motion_searches() {
        let mut fsm = DutyCycleMachine::new();

        let result = fsm.process_event(CycleEvent::TimerFired {
            active: false,
            motion: true,
        });
        assert_eq!(result, TransitionResult::Success(CyclePhase::GpsSearch));
    }

    #[test]
    fn test_cloud_cycle_requires_gps_phase() {
        let mut fsm = DutyCycleMachine::new();

        let result = fsm.process_event(CycleEvent::CloudCycleDone);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.phase(), CyclePhase::Idle);
    }

    #[test]
    fn test_link_transitions() {
        use LinkState::*;

        assert!(is_valid_link_transition(Disconnected, Connecting));
        assert!(is_valid_link_transition(Connecting, Connected));
        assert!(is_valid_link_transition(Connected, Disconnected));
        assert!(is_valid_link_transition(Connecting, Disconnected));
        assert!(!is_valid_link_transition(Disconnected, Connected));
        assert!(!is_valid_link_transition(Connected, Connecting));
    }
}
