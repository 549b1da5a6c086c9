//! Turn a reply body into a locomotion intent, suppressing repeats.

use std::fmt;

/// Status byte that marks a usable reply.
pub const STATUS_OK: u8 = b'2';
const STATUS_AT: usize = 0;
const CODE_AT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Stop,
    Unknown,
}

impl Code {
    pub fn from_byte(b: u8) -> Self {
        match b {
            b'3' => Code::Forward,
            b'2' => Code::Backward,
            b'0' => Code::TurnLeft,
            b'1' => Code::TurnRight,
            b'9' => Code::Stop,
            _ => Code::Unknown,
        }
    }

    /// The intent this code selects; `Unknown` selects none.
    pub fn intent(self) -> Option<Intent> {
        match self {
            Code::Forward => Some(Intent::Forward),
            Code::Backward => Some(Intent::Backward),
            Code::TurnLeft => Some(Intent::TurnLeft),
            Code::TurnRight => Some(Intent::TurnRight),
            Code::Stop => Some(Intent::Stop),
            Code::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive {
    pub status_ok: bool,
    pub code: Code,
}

impl Directive {
    /// First byte is the status class, third byte the command code. Short
    /// bodies decode to a failed status or an unknown code.
    pub fn decode(body: &[u8]) -> Self {
        let status_ok = body.get(STATUS_AT) == Some(&STATUS_OK);
        let code = body
            .get(CODE_AT)
            .copied()
            .map_or(Code::Unknown, Code::from_byte);
        Self { status_ok, code }
    }
}

/// Last code applied; the only state carried from one cycle to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandState {
    pub last_applied: Option<Code>,
}

/// Decide whether `directive` moves the robot. Returns the intent to drive,
/// if any, and the state for the next cycle.
pub fn apply(directive: &Directive, state: CommandState) -> (Option<Intent>, CommandState) {
    if !directive.status_ok {
        return (None, state);
    }
    let effect = if state.last_applied == Some(directive.code) {
        None
    } else {
        directive.code.intent()
    };
    let next = CommandState {
        last_applied: Some(directive.code),
    };
    (effect, next)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Stop,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::Forward => "forward",
            Intent::Backward => "backward",
            Intent::TurnLeft => "turn-left",
            Intent::TurnRight => "turn-right",
            Intent::Stop => "stop",
        };
        f.write_str(s)
    }
}

/// Velocity magnitudes used for every intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Speeds {
    /// mm/s
    pub linear: i32,
    /// deg/s
    pub angular: i32,
}

impl Default for Speeds {
    fn default() -> Self {
        Self {
            linear: 100,
            angular: 30,
        }
    }
}

/// One velocity setpoint, in the order it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setpoint {
    Linear(i32),
    Angular(i32),
}

impl Intent {
    /// Setpoints for this intent. Straight moves zero the rotation first;
    /// turns and stop zero the translation first.
    pub fn setpoints(self, speeds: Speeds) -> [Setpoint; 2] {
        use Setpoint::*;
        match self {
            Intent::Forward => [Angular(0), Linear(speeds.linear)],
            Intent::Backward => [Angular(0), Linear(-speeds.linear)],
            Intent::TurnLeft => [Linear(0), Angular(speeds.angular)],
            Intent::TurnRight => [Linear(0), Angular(-speeds.angular)],
            Intent::Stop => [Linear(0), Angular(0)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(code: Code) -> Directive {
        Directive {
            status_ok: true,
            code,
        }
    }

    #[test]
    fn decode_reads_status_and_code() {
        assert_eq!(Directive::decode(b"2,3"), ok(Code::Forward));
        assert_eq!(Directive::decode(b"2,2"), ok(Code::Backward));
        assert_eq!(Directive::decode(b"2,0"), ok(Code::TurnLeft));
        assert_eq!(Directive::decode(b"2,1"), ok(Code::TurnRight));
        assert_eq!(Directive::decode(b"2,9"), ok(Code::Stop));
        assert_eq!(Directive::decode(b"2,x"), ok(Code::Unknown));
        assert_eq!(Directive::decode(b"2"), ok(Code::Unknown));
        assert_eq!(
            Directive::decode(b"5,3"),
            Directive {
                status_ok: false,
                code: Code::Forward
            }
        );
        assert!(!Directive::decode(b"").status_ok);
    }

    #[test]
    fn repeated_code_is_suppressed() {
        let seq = [Code::Forward, Code::Forward, Code::Stop, Code::Forward];
        let mut state = CommandState::default();
        let mut fired = Vec::new();
        for code in seq {
            let (effect, next) = apply(&ok(code), state);
            state = next;
            fired.extend(effect);
        }
        assert_eq!(fired, vec![Intent::Forward, Intent::Stop, Intent::Forward]);
        assert_eq!(state.last_applied, Some(Code::Forward));
    }

    #[test]
    fn failed_status_changes_nothing() {
        let start = CommandState {
            last_applied: Some(Code::Stop),
        };
        for b in [b'0', b'1', b'2', b'3', b'9', b'x'] {
            let d = Directive {
                status_ok: false,
                code: Code::from_byte(b),
            };
            let (effect, next) = apply(&d, start);
            assert_eq!(effect, None);
            assert_eq!(next, start);
        }
    }

    #[test]
    fn unknown_updates_state_without_effect() {
        let (effect, state) = apply(&ok(Code::Forward), CommandState::default());
        assert_eq!(effect, Some(Intent::Forward));
        let (effect, state) = apply(&ok(Code::Unknown), state);
        assert_eq!(effect, None);
        assert_eq!(state.last_applied, Some(Code::Unknown));
        // forward again after an unknown code is a change
        let (effect, _) = apply(&ok(Code::Forward), state);
        assert_eq!(effect, Some(Intent::Forward));
    }

    #[test]
    fn first_stop_is_applied_from_unset() {
        let (effect, _) = apply(&ok(Code::Stop), CommandState::default());
        assert_eq!(effect, Some(Intent::Stop));
    }

    #[test]
    fn setpoints_follow_intent() {
        let s = Speeds::default();
        use Setpoint::*;
        assert_eq!(Intent::Forward.setpoints(s), [Angular(0), Linear(100)]);
        assert_eq!(Intent::Backward.setpoints(s), [Angular(0), Linear(-100)]);
        assert_eq!(Intent::TurnLeft.setpoints(s), [Linear(0), Angular(30)]);
        assert_eq!(Intent::TurnRight.setpoints(s), [Linear(0), Angular(-30)]);
        assert_eq!(Intent::Stop.setpoints(s), [Linear(0), Angular(0)]);
    }
}
