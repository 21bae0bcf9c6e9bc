//! Indicator rule table and frame renderer.

use super::IndicatorState;
use std::time::Duration;

/// LED colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scale each channel by `level / 255`.
    pub fn scaled(self, level: u8) -> Self {
        let scale = |c: u8| ((c as u16 * level as u16) / 255) as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }
}

/// How a state is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Dark.
    Off { hold: Duration },
    /// Constant colour.
    Solid { color: Rgb, hold: Duration },
    /// Brightness ramps 0 -> `max` -> 0 in increments of `step`.
    Breathe {
        color: Rgb,
        max: u8,
        step: u8,
        frame: Duration,
    },
    /// `count` on/off blinks, then the sequence is done.
    Blink {
        color: Rgb,
        count: u8,
        on: Duration,
        off: Duration,
    },
}

const BLUE: Rgb = Rgb::new(0, 0, 255);
const AMBER: Rgb = Rgb::new(255, 160, 0);
const WHITE: Rgb = Rgb::new(255, 255, 255);
const CYAN: Rgb = Rgb::new(0, 255, 255);

/// One rule per indicator state.
const RULES: [(IndicatorState, Pattern); 7] = [
    (
        IndicatorState::Booting,
        Pattern::Off {
            hold: Duration::from_millis(100),
        },
    ),
    (
        IndicatorState::AwaitingDevice,
        Pattern::Breathe {
            color: BLUE,
            max: 100,
            step: 2,
            frame: Duration::from_millis(20),
        },
    ),
    (
        IndicatorState::ConfigurationMode,
        Pattern::Breathe {
            color: AMBER,
            max: 120,
            step: 3,
            frame: Duration::from_millis(20),
        },
    ),
    (
        IndicatorState::DeviceReady,
        Pattern::Solid {
            color: Rgb::new(0, 128, 0),
            hold: Duration::from_millis(500),
        },
    ),
    (
        IndicatorState::TransferInProgress,
        Pattern::Breathe {
            color: WHITE,
            max: 150,
            step: 5,
            frame: Duration::from_millis(15),
        },
    ),
    (
        IndicatorState::Error,
        Pattern::Solid {
            color: Rgb::new(128, 0, 0),
            hold: Duration::from_millis(500),
        },
    ),
    (
        IndicatorState::UserActionFeedback,
        Pattern::Blink {
            color: CYAN,
            count: 3,
            on: Duration::from_millis(120),
            off: Duration::from_millis(120),
        },
    ),
];

/// Look up the rule for a state.
pub fn pattern_for(state: IndicatorState) -> Pattern {
    RULES
        .iter()
        .find(|(s, _)| *s == state)
        .map(|(_, p)| *p)
        .unwrap_or(Pattern::Off {
            hold: Duration::from_millis(100),
        })
}

/// One rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub color: Rgb,
    pub hold: Duration,
    /// A finite pattern just showed its last frame.
    pub sequence_done: bool,
}

/// Turns successive state snapshots into frames.
///
/// The phase restarts whenever the state changes.
#[derive(Debug, Default)]
pub struct Renderer {
    current: Option<IndicatorState>,
    phase: u32,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next frame for `state`.
    pub fn next_frame(&mut self, state: IndicatorState) -> Frame {
        if self.current != Some(state) {
            self.current = Some(state);
            self.phase = 0;
        }
        let phase = self.phase;
        self.phase = self.phase.wrapping_add(1);

        match pattern_for(state) {
            Pattern::Off { hold } => Frame {
                color: Rgb::OFF,
                hold,
                sequence_done: false,
            },
            Pattern::Solid { color, hold } => Frame {
                color,
                hold,
                sequence_done: false,
            },
            Pattern::Breathe {
                color,
                max,
                step,
                frame,
            } => Frame {
                color: color.scaled(breathe_level(phase, max, step)),
                hold: frame,
                sequence_done: false,
            },
            Pattern::Blink {
                color,
                count,
                on,
                off,
            } => {
                let total = count as u32 * 2;
                if phase >= total {
                    return Frame {
                        color: Rgb::OFF,
                        hold: off,
                        sequence_done: true,
                    };
                }
                let lit = phase % 2 == 0;
                Frame {
                    color: if lit { color } else { Rgb::OFF },
                    hold: if lit { on } else { off },
                    sequence_done: phase + 1 == total,
                }
            }
        }
    }
}

/// Triangle wave: 0, step, 2*step, ..., max, ..., step, 0, ...
fn breathe_level(phase: u32, max: u8, step: u8) -> u8 {
    let step = step.max(1) as u32;
    let steps = (max as u32 / step).max(1);
    let position = phase % (2 * steps);
    let level = if position <= steps {
        position * step
    } else {
        (2 * steps - position) * step
    };
    level.min(max as u32) as u8
}
