//! # Effects Engine
//!
//! The framework-free core of the plugin: parameter cells shared with the
//! control surface, the prepare/release lifecycle, and the per-block
//! dispatcher that runs delay → reverb → gain over every channel.
//!
//! ## Two execution contexts
//!
//! Parameter setters run on whatever thread the host or GUI happens to use;
//! `process_block` runs on the real-time audio thread and must never block,
//! allocate, or fail. The only state the two sides share is
//! [`EngineParams`] — a set of independent word-sized atomic cells read
//! with relaxed ordering once per block. A torn *set* of parameters (gain
//! from this change, feedback from the last one) is accepted: audio
//! parameters are perceptually continuous and a one-block-stale value is
//! inaudible. Everything else — the delay ring, the cursor, the reverb
//! tails — is owned exclusively by the audio thread.
//!
//! ## Two lifecycle states
//!
//! The engine is either **Unprepared** (no buffers, processing is a no-op)
//! or **Prepared** (buffers sized for the session's sample rate and block
//! size). `prepare` allocates and validates outside the real-time path;
//! re-preparing replaces the old state wholesale, it never appends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::dsp::delay::{delay_samples_for, DelayStage};
use crate::dsp::delay_buffer::DelayBuffer;
use crate::dsp::reverb::{Reverb, ReverbParams};

/// Longest delay time the control surface exposes, in milliseconds. The
/// ring capacity chosen at prepare time must cover this with room to
/// spare, and `prepare` verifies that it does.
pub const MAX_DELAY_MS: f32 = 1000.0;

/// Highest feedback level a setter will accept. Unity feedback never
/// decays; anything above it grows without bound.
pub const MAX_FEEDBACK: f32 = 0.95;

/// A single lock-free `f32` cell: stored as raw bits in an `AtomicU32`,
/// relaxed ordering on both ends. Writers are the control surface; the
/// audio thread only ever reads.
struct ParamCell(AtomicU32);

impl ParamCell {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// The scalar parameters shared between the control surface and the audio
/// thread. Setters clamp silently to the valid range — the control surface
/// is the only caller, and swallowing an out-of-range value beats glitching
/// the audio path — and never block.
pub struct EngineParams {
    delay_time_ms: ParamCell,
    feedback: ParamCell,
    room_size: ParamCell,
    damping: ParamCell,
    width: ParamCell,
    wet_level: ParamCell,
    dry_level: ParamCell,
    gain: ParamCell,
}

/// Plain-`f32` copy of every parameter, taken once per block by the
/// dispatcher and also served to the control surface for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSnapshot {
    pub delay_time_ms: f32,
    pub feedback: f32,
    pub room_size: f32,
    pub damping: f32,
    pub width: f32,
    pub wet_level: f32,
    pub dry_level: f32,
    pub gain: f32,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            delay_time_ms: ParamCell::new(400.0),
            feedback: ParamCell::new(0.8),
            room_size: ParamCell::new(0.5),
            damping: ParamCell::new(0.5),
            width: ParamCell::new(0.5),
            wet_level: ParamCell::new(0.33),
            dry_level: ParamCell::new(0.4),
            gain: ParamCell::new(0.8),
        }
    }
}

impl EngineParams {
    pub fn set_delay_time_ms(&self, ms: f32) {
        self.delay_time_ms.set(clamp_finite(ms, 0.0, MAX_DELAY_MS));
    }

    pub fn set_feedback(&self, level: f32) {
        self.feedback.set(clamp_finite(level, 0.0, MAX_FEEDBACK));
    }

    pub fn set_room_size(&self, x: f32) {
        self.room_size.set(clamp_finite(x, 0.0, 1.0));
    }

    pub fn set_damping(&self, x: f32) {
        self.damping.set(clamp_finite(x, 0.0, 1.0));
    }

    pub fn set_width(&self, x: f32) {
        self.width.set(clamp_finite(x, 0.0, 1.0));
    }

    pub fn set_wet_level(&self, x: f32) {
        self.wet_level.set(clamp_finite(x, 0.0, 1.0));
    }

    pub fn set_dry_level(&self, x: f32) {
        self.dry_level.set(clamp_finite(x, 0.0, 1.0));
    }

    pub fn set_gain(&self, x: f32) {
        self.gain.set(clamp_finite(x, 0.0, 1.0));
    }

    /// One relaxed load per parameter. Values from different setter calls
    /// may mix within a snapshot; that is the accepted consistency model.
    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            delay_time_ms: self.delay_time_ms.get(),
            feedback: self.feedback.get(),
            room_size: self.room_size.get(),
            damping: self.damping.get(),
            width: self.width.get(),
            wet_level: self.wet_level.get(),
            dry_level: self.dry_level.get(),
            gain: self.gain.get(),
        }
    }
}

/// Clamp with NaN swallowed to the lower bound. `f32::clamp` panics on a
/// NaN bound but passes a NaN input through; a NaN parameter must never
/// reach the audio path.
fn clamp_finite(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Configuration errors raised by [`EffectsEngine::prepare`]. These fire
/// outside the real-time path; once prepared, processing cannot fail.
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f32),

    #[error("maximum block size must be non-zero")]
    ZeroBlockSize,

    #[error(
        "delay buffer of {capacity} samples cannot hold the maximum delay of {required} samples"
    )]
    CapacityTooSmall { capacity: usize, required: usize },
}

/// Buffers and audio-thread state that exist only while Prepared.
struct PreparedState {
    sample_rate: f32,
    delay_buffer: DelayBuffer,
    delay: DelayStage,
    reverb: Reverb,
    /// Scratch block for the delayed signal, sized to the host's maximum
    /// block length at prepare time so processing never allocates.
    scratch: Vec<f32>,
    /// Next ring slot to be written. Shared by all channels; advances once
    /// per block, modulo the ring capacity.
    write_pos: usize,
}

/// The complete per-session effect: delay with feedback, reverb, gain.
pub struct EffectsEngine {
    params: Arc<EngineParams>,
    prepared: Option<PreparedState>,
}

impl EffectsEngine {
    pub fn new(params: Arc<EngineParams>) -> Self {
        Self {
            params,
            prepared: None,
        }
    }

    /// Read-only view of the shared parameters, for display.
    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    /// Allocate and size everything for a session: the delay ring at
    /// `2 × sample_rate + max_block_size` samples (double the 1-second
    /// maximum delay, plus a block of headroom), the reverb network, and
    /// the scratch block. Validates here, outside the real-time path, that
    /// the ring can hold the longest delay the control surface can request.
    ///
    /// Calling `prepare` while already prepared replaces the old state
    /// wholesale: fresh silent buffers, cursor back to zero.
    pub fn prepare(
        &mut self,
        sample_rate: f32,
        max_block_size: usize,
        num_channels: usize,
    ) -> Result<(), PrepareError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(PrepareError::InvalidSampleRate(sample_rate));
        }
        if max_block_size == 0 {
            return Err(PrepareError::ZeroBlockSize);
        }

        let capacity = 2 * sample_rate as usize + max_block_size;
        let required = delay_samples_for(MAX_DELAY_MS, sample_rate);
        if required >= capacity {
            return Err(PrepareError::CapacityTooSmall { capacity, required });
        }

        self.prepared = Some(PreparedState {
            sample_rate,
            delay_buffer: DelayBuffer::new(num_channels, capacity),
            delay: DelayStage::new(),
            reverb: Reverb::new(num_channels, sample_rate),
            scratch: vec![0.0; max_block_size],
            write_pos: 0,
        });
        Ok(())
    }

    /// Drop back to Unprepared, freeing all buffers. Processing becomes a
    /// no-op until the next `prepare`.
    pub fn release(&mut self) {
        self.prepared = None;
    }

    /// Clear the audible history — ring, reverb tails, cursor — without
    /// reallocating. For the host's stop/start cycle, where the session
    /// format is unchanged but stale echoes must not bleed into the next
    /// playback.
    pub fn reset(&mut self) {
        if let Some(state) = self.prepared.as_mut() {
            state.delay_buffer.clear();
            state.reverb.clear();
            state.delay.reset();
            state.write_pos = 0;
        }
    }

    /// Process one host block in place: delay → reverb → gain on each of
    /// the first `num_input_channels` channels, silence on any output
    /// channel beyond that, then advance the shared write cursor once.
    ///
    /// Never blocks, never allocates, never fails. When Unprepared, on a
    /// zero-length block, or with no channels, this is a no-op.
    pub fn process_block(&mut self, buffer: &mut [&mut [f32]], num_input_channels: usize) {
        let Some(state) = self.prepared.as_mut() else {
            return;
        };

        let num_samples = buffer.first().map_or(0, |channel| channel.len());
        if num_samples == 0 || buffer.is_empty() {
            return;
        }

        // Hosts honor the max_block_size they handed to prepare; truncate
        // defensively if one does not, rather than index past the scratch
        // block.
        debug_assert!(num_samples <= state.scratch.len());
        let num_samples = num_samples.min(state.scratch.len());

        // Output channels with no corresponding input get silence, never
        // stale or uninitialized samples (mono-in/stereo-out case).
        let fed = num_input_channels.min(buffer.len());
        for channel in buffer[fed..].iter_mut() {
            channel[..num_samples].fill(0.0);
        }

        // Never index channels the ring was not allocated for.
        let active = fed.min(state.delay_buffer.num_channels());
        let snapshot = self.params.snapshot();

        let delay_samples = delay_samples_for(snapshot.delay_time_ms, state.sample_rate);
        state.delay.process_block(
            &mut state.delay_buffer,
            &mut buffer[..active],
            state.write_pos,
            delay_samples,
            snapshot.feedback,
            &mut state.scratch[..num_samples],
        );

        state.reverb.set_parameters(&ReverbParams {
            room_size: snapshot.room_size,
            damping: snapshot.damping,
            width: snapshot.width,
            wet_level: snapshot.wet_level,
            dry_level: snapshot.dry_level,
        });
        for (channel, io) in buffer[..active].iter_mut().enumerate() {
            state.reverb.process_channel(channel, &mut io[..num_samples]);
        }

        apply_gain(&mut buffer[..active], num_samples, snapshot.gain);

        // One advance per block, not per channel: every channel of the
        // next block must start from the same cursor.
        state.write_pos = (state.write_pos + num_samples) % state.delay_buffer.capacity();
    }
}

/// The final gain stage: one block-uniform scalar multiply over every
/// output sample. No intra-block ramp — a rapid gain sweep can click, an
/// accepted trade for the branch-free hot loop.
fn apply_gain(buffer: &mut [&mut [f32]], num_samples: usize, gain: f32) {
    for channel in buffer.iter_mut() {
        for sample in channel[..num_samples].iter_mut() {
            *sample *= gain;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
