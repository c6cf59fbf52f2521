//! # Echoverb — A VST3/CLAP Delay + Reverb Combo Plugin
//!
//! A combo effect built with [nih-plug](https://github.com/robbert-vdh/nih-plug):
//! a feedback delay into an algorithmic reverb into an output gain, all
//! processed block-at-a-time in place on the host's buffer.
//!
//! ## Signal Flow
//!
//! ```text
//! Input ──►(+)──► [Delay Ring Buffer] ──► delayed ── × feedback ──┐
//!           ▲      (per channel, shared        │                  │
//!           │       write cursor)              │                  │
//!           └──────────────────────────────────│──────────────────┘
//!                                              ▼
//!           in + delayed × feedback ──► [Reverb] ──► [Gain] ──► Output
//!                                    (8 combs + 4 all-passes
//!                                     per channel, wet/dry mix)
//! ```
//!
//! This file is only the plugin shell: host lifecycle, bus layouts, and
//! format metadata. The DSP lives in [`engine`] and [`dsp`], which know
//! nothing about nih-plug and carry their own tests.

mod dsp;
mod engine;
mod params;

use std::num::NonZeroU32;
use std::sync::Arc;

use nih_plug::prelude::*;

use engine::{EffectsEngine, EngineParams};
use params::EchoverbParams;

/// Reverb tail allowance reported to the host while the wet level is up.
/// The Freeverb topology has no closed-form decay time; three seconds
/// covers the largest room at full feedback.
const REVERB_TAIL_SECONDS: f32 = 3.0;

/// The plugin: the host-shared parameter set and the audio-thread-owned
/// engine.
///
/// Parameters are behind an `Arc` because the host holds them too — they
/// are written from GUI/automation threads and forwarded into the engine's
/// lock-free cells. The engine (delay ring, reverb tails, cursor) is owned
/// exclusively by the audio thread and only touched in lifecycle callbacks
/// and `process()`.
struct Echoverb {
    params: Arc<EchoverbParams>,
    engine: EffectsEngine,

    /// Session sample rate, set in `initialize()`. Only used here for the
    /// tail-length report; the engine keeps its own copy.
    sample_rate: f32,
}

impl Default for Echoverb {
    fn default() -> Self {
        let engine_params = Arc::new(EngineParams::default());
        Self {
            params: Arc::new(EchoverbParams::new(&engine_params)),
            engine: EffectsEngine::new(engine_params),
            sample_rate: 44100.0,
        }
    }
}

impl Echoverb {
    /// Estimate how long the effect keeps ringing after the input goes
    /// silent, so the host keeps calling `process()` instead of cutting
    /// the echoes off.
    ///
    /// Each repeat is attenuated by the feedback factor, so after N
    /// repeats the level is `feedback^N`. Solving `feedback^N = 0.001`
    /// (−60 dB) gives `N = -3 / log10(feedback)`; multiplied by the delay
    /// period that is the delay tail. The reverb adds a flat allowance
    /// whenever its wet level is nonzero.
    fn tail_samples(&self) -> u32 {
        let snapshot = self.engine.params().snapshot();
        let delay_samples = snapshot.delay_time_ms / 1000.0 * self.sample_rate;

        let delay_tail = if snapshot.feedback > 0.001 {
            let repeats = -3.0 / snapshot.feedback.log10();
            repeats * delay_samples
        } else {
            delay_samples
        };

        let reverb_tail = if snapshot.wet_level > 0.0 {
            REVERB_TAIL_SECONDS * self.sample_rate
        } else {
            0.0
        };

        (delay_tail + reverb_tail) as u32
    }
}

impl Plugin for Echoverb {
    const NAME: &'static str = "Echoverb";
    const VENDOR: &'static str = "Echoverb Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo first — most DAW tracks are stereo — with a mono fallback.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Host → engine `prepare`: the one place buffers are allocated. The
    /// engine validates the configuration here, outside the real-time
    /// path; a bad sample rate means the host configuration is unusable
    /// and the load is refused.
    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        self.sample_rate = buffer_config.sample_rate;

        let num_channels = audio_io_layout
            .main_input_channels
            .map(|c| c.get() as usize)
            .unwrap_or(2);

        match self.engine.prepare(
            buffer_config.sample_rate,
            buffer_config.max_buffer_size as usize,
            num_channels,
        ) {
            Ok(()) => true,
            Err(err) => {
                nih_error!("refusing to initialize: {err}");
                false
            }
        }
    }

    /// Host stop/start: wipe the audible history (ring, reverb tails,
    /// cursor) in place so stale echoes don't bleed into the next
    /// playback. The session format is unchanged, so nothing reallocates.
    fn reset(&mut self) {
        self.engine.reset();
    }

    /// Host teardown: back to Unprepared, buffers freed. `initialize`
    /// runs again before any further processing.
    fn deactivate(&mut self) {
        self.engine.release();
    }

    /// One host callback, one block: hand the channel slices to the
    /// engine's dispatcher (delay → reverb → gain, cursor advanced once),
    /// then tell the host how long the effect tail currently is.
    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let num_channels = buffer.channels();
        self.engine.process_block(buffer.as_slice(), num_channels);

        ProcessStatus::Tail(self.tail_samples())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Plugin format trait implementations
// ─────────────────────────────────────────────────────────────────────

impl ClapPlugin for Echoverb {
    const CLAP_ID: &'static str = "com.echoverb-audio.echoverb";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A feedback delay into an algorithmic reverb with output gain");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Delay,
        ClapFeature::Reverb,
    ];
}

impl Vst3Plugin for Echoverb {
    // Must be globally unique across all VST3 plugins; sixteen ASCII
    // bytes derived from the plugin name.
    const VST3_CLASS_ID: [u8; 16] = *b"EchoverbCombo_v1";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] = &[
        Vst3SubCategory::Fx,
        Vst3SubCategory::Delay,
        Vst3SubCategory::Reverb,
    ];
}

// Generate the C-compatible entry points hosts use to discover the
// plugin.
nih_export_clap!(Echoverb);
nih_export_vst3!(Echoverb);
