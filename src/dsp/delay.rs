//! # Feedback Delay Stage
//!
//! Turns the [`DelayBuffer`](super::delay_buffer::DelayBuffer) ring into an
//! echo. For every channel of every block:
//!
//! 1. the dry input block is written into the ring at the shared write
//!    cursor,
//! 2. the block sitting `delay_samples` behind the cursor is read out,
//! 3. the delayed block, scaled by the feedback level, is mixed into the
//!    host buffer: `out[i] = in[i] + delayed[i] * feedback`,
//! 4. the same scaled delayed block is added back into the ring at the
//!    write cursor, so the ring slot ends up holding the **processed**
//!    sample.
//!
//! Step 4 is what makes the echoes compound: the sample the ring remembers
//! is `in + delayed * feedback`, so a single impulse comes back at
//! `feedback`, `feedback²`, `feedback³`, ... — a geometric decay. Writing
//! the raw dry sample instead would produce exactly one repeat per impulse.
//!
//! The feedback level is sampled once per block, so it ramps linearly from
//! the previous block's value to the current one (steps 3 and 4 use the
//! same ramp). All channels of a block start from the same cursor value;
//! advancing the cursor is the dispatcher's job, once per block.

use super::delay_buffer::{ramp_increment, DelayBuffer};

/// Convert a delay time in milliseconds to a whole number of samples at
/// the given sample rate.
pub fn delay_samples_for(delay_ms: f32, sample_rate: f32) -> usize {
    (delay_ms / 1000.0 * sample_rate).round() as usize
}

/// The feedback delay stage. Stateless apart from the feedback value the
/// previous block ended on, which anchors the per-block gain ramp.
pub struct DelayStage {
    /// Feedback level at the end of the previous block; `None` right after
    /// a reset, in which case the first block runs flat.
    feedback_ramp: Option<f32>,
}

impl DelayStage {
    pub fn new() -> Self {
        Self {
            feedback_ramp: None,
        }
    }

    /// Forget the ramp anchor. Called when the engine clears its history so
    /// the first block of a fresh session does not ramp from a stale value.
    pub fn reset(&mut self) {
        self.feedback_ramp = None;
    }

    /// Process one block for every channel in `buffer`.
    ///
    /// `scratch` must be sliced to the block length by the caller; it holds
    /// the delayed block between the ring read and the two ramped copies.
    /// `delay_samples` is clamped to `capacity - 1` here, before the read
    /// position is computed — a larger value would wrap the read cursor
    /// past the write cursor and alias into future samples.
    ///
    /// The shared write cursor is *not* advanced here. Every channel must
    /// see the same cursor value for the block, so the dispatcher advances
    /// it exactly once afterwards.
    pub fn process_block(
        &mut self,
        ring: &mut DelayBuffer,
        buffer: &mut [&mut [f32]],
        write_pos: usize,
        delay_samples: usize,
        feedback: f32,
        scratch: &mut [f32],
    ) {
        let num_samples = scratch.len();
        if num_samples == 0 || buffer.is_empty() {
            return;
        }

        let capacity = ring.capacity();
        let delay_samples = delay_samples.min(capacity - 1);
        let read_pos = (write_pos + capacity - delay_samples) % capacity;

        let fb_start = self.feedback_ramp.unwrap_or(feedback);
        let fb_end = feedback;
        let increment = ramp_increment(fb_start, fb_end, num_samples);

        for (channel, io) in buffer.iter_mut().enumerate() {
            let io = &mut io[..num_samples];

            // Dry history first: the ring must hold this block's input
            // before the feedback component is accumulated on top.
            ring.write_from(channel, write_pos, io, 1.0, 1.0);
            ring.read_into(channel, read_pos, scratch);

            // out = in + delayed * feedback, with the feedback level
            // ramping across the block.
            let mut gain = fb_start;
            for (out, &delayed) in io.iter_mut().zip(scratch.iter()) {
                *out += delayed * gain;
                gain += increment;
            }

            // Wet write-back: the ring slot becomes in + delayed * feedback,
            // the same value the host buffer now holds.
            ring.add_from(channel, write_pos, scratch, fb_start, fb_end);
        }

        self.feedback_ramp = Some(fb_end);
    }
}

impl Default for DelayStage {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Run `total` samples of `input` through the stage in blocks of
    /// `block_len`, advancing the cursor once per block the way the
    /// dispatcher does, and return the processed signal.
    fn run_mono(
        input: &[f32],
        block_len: usize,
        capacity: usize,
        delay_samples: usize,
        feedback: f32,
    ) -> Vec<f32> {
        let mut ring = DelayBuffer::new(1, capacity);
        let mut stage = DelayStage::new();
        let mut scratch = vec![0.0; block_len];
        let mut write_pos = 0;

        let mut output = input.to_vec();
        for block in output.chunks_mut(block_len) {
            let n = block.len();
            let mut channels: [&mut [f32]; 1] = [block];
            stage.process_block(
                &mut ring,
                &mut channels,
                write_pos,
                delay_samples,
                feedback,
                &mut scratch[..n],
            );
            write_pos = (write_pos + n) % capacity;
        }
        output
    }

    /// A unit impulse must come back as echoes at t = d, 2d, 3d with
    /// magnitudes g, g², g³ — and nothing in between. This is the decay
    /// law that distinguishes wet write-back from a single dry repeat.
    #[test]
    fn test_impulse_decays_geometrically() {
        let delay = 200;
        let feedback = 0.5;
        let mut input = vec![0.0; 700];
        input[0] = 1.0;

        let output = run_mono(&input, 64, 4096, delay, feedback);

        for (t, &sample) in output.iter().enumerate() {
            let expected = match t {
                0 => 1.0,
                200 => 0.5,
                400 => 0.25,
                600 => 0.125,
                _ => 0.0,
            };
            assert!(
                (sample - expected).abs() < 1e-5,
                "t = {t}: expected {expected}, got {sample}"
            );
        }
    }

    /// Zero delay with zero feedback is a pure passthrough.
    #[test]
    fn test_zero_delay_zero_feedback_passthrough() {
        let input: Vec<f32> = (0..256).map(|i| (i as f32 * 0.1).sin()).collect();

        let output = run_mono(&input, 32, 1024, 0, 0.0);

        for (t, (o, i)) in output.iter().zip(&input).enumerate() {
            assert!((o - i).abs() < 1e-6, "t = {t}: expected {i}, got {o}");
        }
    }

    /// A delay shorter than the block still echoes at the right offset,
    /// inside the same block. Block processing reads the ring before the
    /// wet write-back lands, so a sub-block delay yields the first repeat
    /// only — compounding needs the delay to reach the next block.
    #[test]
    fn test_sub_block_delay() {
        let mut input = vec![0.0; 64];
        input[0] = 1.0;

        let output = run_mono(&input, 64, 1024, 10, 0.5);

        assert!((output[0] - 1.0).abs() < 1e-6);
        assert!((output[10] - 0.5).abs() < 1e-6);
        assert!(output[5].abs() < 1e-6);
        assert!(output[20].abs() < 1e-6);
    }

    /// A delay request at or past the ring capacity is clamped to
    /// `capacity - 1` rather than allowed to wrap the read cursor
    /// unpredictably: the echo lands exactly `capacity - 1` samples after
    /// the impulse.
    #[test]
    fn test_oversized_delay_is_clamped() {
        let capacity = 256;
        let mut input = vec![0.0; 256];
        input[0] = 1.0;

        let output = run_mono(&input, 32, capacity, 100_000, 0.9);

        for (t, &sample) in output.iter().enumerate() {
            let expected = match t {
                0 => 1.0,
                255 => 0.9,
                _ => 0.0,
            };
            assert!(
                (sample - expected).abs() < 1e-5,
                "t = {t}: expected {expected}, got {sample}"
            );
        }
    }

    /// The echo of one channel never leaks into another: channels share
    /// the cursor but own separate rings.
    #[test]
    fn test_channels_stay_separate() {
        let capacity = 1024;
        let mut ring = DelayBuffer::new(2, capacity);
        let mut stage = DelayStage::new();
        let mut scratch = [0.0; 64];

        let mut left = [0.0_f32; 64];
        left[0] = 1.0;
        let mut right = [0.0_f32; 64];

        let mut write_pos = 0;
        for _ in 0..4 {
            let mut channels: [&mut [f32]; 2] = [&mut left, &mut right];
            stage.process_block(&mut ring, &mut channels, write_pos, 16, 0.5, &mut scratch);
            write_pos = (write_pos + 64) % capacity;
            left.fill(0.0);
        }

        assert!(
            right.iter().all(|s| s.abs() < 1e-6),
            "unfed channel must stay silent"
        );
    }
}
