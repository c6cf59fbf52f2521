//! # Plugin Parameters
//!
//! The host-facing control surface: one `FloatParam` per knob, registered
//! with the DAW through the `#[derive(Params)]` macro (which also gives us
//! preset save/recall for free — the engine itself never persists
//! anything).
//!
//! The engine does not read these params directly. Each one carries a
//! callback that forwards new values into the engine's shared
//! [`EngineParams`](crate::engine::EngineParams) cells, where the audio
//! thread picks them up once per block with a relaxed atomic load. Host
//! automation, GUI drags, and preset recalls all funnel through the same
//! callbacks, so the engine sees every source of parameter change the same
//! way. The string IDs are preset-stable: once published, never change
//! them.

use std::sync::Arc;

use nih_plug::prelude::*;

use crate::engine::{EngineParams, MAX_DELAY_MS, MAX_FEEDBACK};

/// All user-facing parameters of the combo effect: the delay pair, the
/// five reverb controls, and the output gain.
#[derive(Params)]
pub struct EchoverbParams {
    /// Time before the first repeat. The skewed range gives the lower
    /// half of the knob to the short-delay territory where small changes
    /// matter most.
    #[id = "delay"]
    pub delay_time: FloatParam,

    /// How much of the delayed signal re-enters the delay line. Capped
    /// below unity: at 100% the echoes would never decay.
    #[id = "fdbk"]
    pub feedback: FloatParam,

    /// Reverb room size — longer decay as the room grows.
    #[id = "room"]
    pub room_size: FloatParam,

    /// High-frequency loss per reflection; higher values darken the tail
    /// faster.
    #[id = "damp"]
    pub damping: FloatParam,

    /// Stereo width of the reverb's wet signal.
    #[id = "width"]
    pub width: FloatParam,

    /// Reverberated (wet) signal level.
    #[id = "wet"]
    pub wet_level: FloatParam,

    /// Untouched (dry) signal level through the reverb stage.
    #[id = "dry"]
    pub dry_level: FloatParam,

    /// Final output gain, applied after everything else.
    #[id = "gain"]
    pub gain: FloatParam,
}

/// Build the callback that pushes a parameter change into the engine's
/// shared cells. `set` is one of the `EngineParams` setters, which clamp
/// and never block, so these are safe to fire from any thread.
fn forward(
    engine: &Arc<EngineParams>,
    set: fn(&EngineParams, f32),
) -> Arc<dyn Fn(f32) + Send + Sync> {
    let engine = Arc::clone(engine);
    Arc::new(move |value| set(&engine, value))
}

impl EchoverbParams {
    /// Construct the parameter set wired to `engine`. Defaults mirror the
    /// engine's construction defaults, so the two sides agree before the
    /// first callback ever fires.
    pub fn new(engine: &Arc<EngineParams>) -> Self {
        Self {
            delay_time: FloatParam::new(
                "Delay Time",
                400.0,
                FloatRange::Skewed {
                    min: 0.0,
                    max: MAX_DELAY_MS,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_unit(" ms")
            .with_step_size(1.0)
            .with_callback(forward(engine, EngineParams::set_delay_time_ms)),

            feedback: FloatParam::new(
                "Feedback",
                0.80,
                FloatRange::Linear {
                    min: 0.0,
                    max: MAX_FEEDBACK,
                },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage())
            .with_callback(forward(engine, EngineParams::set_feedback)),

            room_size: FloatParam::new(
                "Room Size",
                0.50,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage())
            .with_callback(forward(engine, EngineParams::set_room_size)),

            damping: FloatParam::new(
                "Damping",
                0.50,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage())
            .with_callback(forward(engine, EngineParams::set_damping)),

            width: FloatParam::new("Width", 0.50, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage())
                .with_callback(forward(engine, EngineParams::set_width)),

            wet_level: FloatParam::new(
                "Reverb Wet",
                0.33,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage())
            .with_callback(forward(engine, EngineParams::set_wet_level)),

            dry_level: FloatParam::new(
                "Reverb Dry",
                0.40,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage())
            .with_callback(forward(engine, EngineParams::set_dry_level)),

            gain: FloatParam::new("Gain", 0.80, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage())
                .with_callback(forward(engine, EngineParams::set_gain)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
