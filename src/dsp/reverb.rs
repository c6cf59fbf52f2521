//! # Reverb Stage
//!
//! A Freeverb-style algorithmic reverberator: per channel, eight parallel
//! feedback comb filters build the dense reflection tail, then four series
//! all-pass filters smear the phase so the combs' metallic ringing blurs
//! into a diffuse wash. The comb/all-pass delay lengths are the classic
//! 44.1 kHz tunings, scaled to the session sample rate; each channel's
//! lengths are offset by a small per-channel spread so the channels
//! decorrelate instead of reverberating in lockstep.
//!
//! Each channel is reverberated independently (mono-per-channel); the
//! width control folds into the wet gain rather than cross-feeding the
//! channels.
//!
//! `set_parameters` only recomputes a handful of scalar coefficients — no
//! buffer is cleared, no state is reset — so it is safe to call once per
//! block without clicks. The filter state carries the tail across blocks
//! and is only cleared at prepare/reset.

/// Comb filter delay lengths in samples at 44.1 kHz.
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// All-pass filter delay lengths in samples at 44.1 kHz.
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];

/// Per-channel offset added to every tuning, in samples at 44.1 kHz.
const CHANNEL_SPREAD: usize = 23;

/// Input attenuation into the comb bank. Eight combs sum back together, so
/// the input is scaled down to keep the wet signal in range.
const FIXED_GAIN: f32 = 0.015;

/// Room-size-to-comb-feedback mapping: `0.7 + 0.28 * room_size`.
const SCALE_ROOM: f32 = 0.28;
const OFFSET_ROOM: f32 = 0.7;

/// Damping control to one-pole coefficient mapping.
const SCALE_DAMP: f32 = 0.4;

/// Wet/dry level scale factors.
const SCALE_WET: f32 = 3.0;
const SCALE_DRY: f32 = 2.0;

/// All-pass feedback coefficient, fixed in the Freeverb topology.
const ALLPASS_FEEDBACK: f32 = 0.5;

/// The block-rate parameter set consumed by [`Reverb::set_parameters`].
/// Every field is expected in `[0, 1]`; the engine's setters clamp before
/// values ever get here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbParams {
    pub room_size: f32,
    pub damping: f32,
    pub width: f32,
    pub wet_level: f32,
    pub dry_level: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.5,
            width: 0.5,
            wet_level: 0.33,
            dry_level: 0.4,
        }
    }
}

/// Feedback comb filter with a one-pole lowpass in the feedback path. The
/// lowpass is the damping: every trip around the loop sheds a little more
/// high-frequency energy, so the tail darkens as it decays.
struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl Comb {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_state = output * (1.0 - damp) + self.filter_state * damp;
        self.buffer[self.pos] = input + self.filter_state * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
        self.filter_state = 0.0;
    }
}

/// Schroeder all-pass: flat magnitude response, scrambled phase. Stacked
/// in series after the combs to multiply the echo density.
struct AllPass {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllPass {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let output = delayed - input;
        self.buffer[self.pos] = input + delayed * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// One channel's filter network.
struct ChannelState {
    combs: Vec<Comb>,
    allpasses: Vec<AllPass>,
}

/// The reverb stage: one independent filter network per channel, plus the
/// scalar coefficients shared by all of them for the current block.
pub struct Reverb {
    channels: Vec<ChannelState>,
    feedback: f32,
    damp: f32,
    wet_gain: f32,
    dry_gain: f32,
}

impl Reverb {
    /// Allocate the filter network for `num_channels` channels at the given
    /// sample rate. The 44.1 kHz tunings are stretched by
    /// `sample_rate / 44100` so the reverb keeps the same character at any
    /// session rate.
    pub fn new(num_channels: usize, sample_rate: f32) -> Self {
        let scale = sample_rate / 44100.0;
        let scaled = |tuning: usize| ((tuning as f32) * scale).round().max(1.0) as usize;

        let channels = (0..num_channels)
            .map(|ch| {
                let spread = ch * CHANNEL_SPREAD;
                ChannelState {
                    combs: COMB_TUNINGS
                        .iter()
                        .map(|&t| Comb::new(scaled(t + spread)))
                        .collect(),
                    allpasses: ALLPASS_TUNINGS
                        .iter()
                        .map(|&t| AllPass::new(scaled(t + spread)))
                        .collect(),
                }
            })
            .collect();

        let mut reverb = Self {
            channels,
            feedback: 0.0,
            damp: 0.0,
            wet_gain: 0.0,
            dry_gain: 0.0,
        };
        reverb.set_parameters(&ReverbParams::default());
        reverb
    }

    /// Update the derived coefficients for the next block. Cheap — a few
    /// scalar multiplies, no state is touched — so a per-block call never
    /// produces a click or restarts the tail.
    pub fn set_parameters(&mut self, params: &ReverbParams) {
        self.feedback = OFFSET_ROOM + SCALE_ROOM * params.room_size;
        self.damp = SCALE_DAMP * params.damping;
        self.wet_gain = SCALE_WET * params.wet_level * (0.5 + 0.5 * params.width);
        self.dry_gain = SCALE_DRY * params.dry_level;
    }

    /// Reverberate one channel's block in place, mixing wet and dry per
    /// the current gains.
    pub fn process_channel(&mut self, channel: usize, samples: &mut [f32]) {
        let state = &mut self.channels[channel];
        for sample in samples.iter_mut() {
            let input = *sample;
            let comb_input = input * FIXED_GAIN;

            let mut wet = 0.0;
            for comb in &mut state.combs {
                wet += comb.process(comb_input, self.feedback, self.damp);
            }
            for allpass in &mut state.allpasses {
                wet = allpass.process(wet);
            }

            *sample = wet * self.wet_gain + input * self.dry_gain;
        }
    }

    /// Silence every comb and all-pass buffer. Only called at
    /// prepare/reset — never between blocks.
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            for comb in &mut channel.combs {
                comb.clear();
            }
            for allpass in &mut channel.allpasses {
                allpass.clear();
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn wet_only_params() -> ReverbParams {
        ReverbParams {
            room_size: 0.5,
            damping: 0.5,
            width: 1.0,
            wet_level: 1.0,
            dry_level: 0.0,
        }
    }

    /// An impulse must produce a tail: energy keeps arriving well after
    /// the input has gone silent.
    #[test]
    fn test_impulse_produces_tail() {
        let mut reverb = Reverb::new(1, 44100.0);
        reverb.set_parameters(&wet_only_params());

        let mut block = vec![0.0_f32; 4096];
        block[0] = 1.0;
        reverb.process_channel(0, &mut block);

        let late_energy: f32 = block[2048..].iter().map(|s| s * s).sum();
        assert!(
            late_energy > 0.0,
            "expected reverb energy after the impulse, got silence"
        );
    }

    /// The tail must decay: with a stable room size, trailing silence
    /// blocks carry less and less energy.
    #[test]
    fn test_tail_decays() {
        let mut reverb = Reverb::new(1, 44100.0);
        reverb.set_parameters(&wet_only_params());

        let mut block = vec![0.0_f32; 8192];
        block[0] = 1.0;
        reverb.process_channel(0, &mut block);

        let energy = |s: &[f32]| s.iter().map(|x| x * x).sum::<f32>();
        let mut tail = vec![0.0_f32; 8192];

        reverb.process_channel(0, &mut tail);
        let early = energy(&tail);

        for _ in 0..20 {
            tail.fill(0.0);
            reverb.process_channel(0, &mut tail);
        }
        let late = energy(&tail);

        assert!(
            late < early * 0.5,
            "tail did not decay: early {early}, late {late}"
        );
    }

    /// With the wet path muted, the stage reduces to the scaled dry gain:
    /// `dry_level = 0.5` is unity.
    #[test]
    fn test_dry_only_is_scaled_passthrough() {
        let mut reverb = Reverb::new(1, 48000.0);
        reverb.set_parameters(&ReverbParams {
            wet_level: 0.0,
            dry_level: 0.5,
            ..ReverbParams::default()
        });

        let input: Vec<f32> = (0..512).map(|i| (i as f32 * 0.05).cos()).collect();
        let mut block = input.clone();
        reverb.process_channel(0, &mut block);

        for (t, (o, i)) in block.iter().zip(&input).enumerate() {
            assert!((o - i).abs() < 1e-6, "t = {t}: expected {i}, got {o}");
        }
    }

    /// `set_parameters` must not clear state: a tail started before the
    /// call keeps ringing after it.
    #[test]
    fn test_set_parameters_keeps_tail() {
        let mut reverb = Reverb::new(1, 44100.0);
        reverb.set_parameters(&wet_only_params());

        let mut block = vec![0.0_f32; 2048];
        block[0] = 1.0;
        reverb.process_channel(0, &mut block);

        reverb.set_parameters(&ReverbParams {
            room_size: 0.9,
            ..wet_only_params()
        });

        let mut tail = vec![0.0_f32; 2048];
        reverb.process_channel(0, &mut tail);
        let energy: f32 = tail.iter().map(|s| s * s).sum();
        assert!(
            energy > 0.0,
            "parameter update must not restart the tail"
        );
    }

    /// `clear` does reset the tail.
    #[test]
    fn test_clear_silences_tail() {
        let mut reverb = Reverb::new(1, 44100.0);
        reverb.set_parameters(&wet_only_params());

        let mut block = vec![0.0_f32; 2048];
        block[0] = 1.0;
        reverb.process_channel(0, &mut block);

        reverb.clear();

        let mut tail = vec![0.0_f32; 4096];
        reverb.process_channel(0, &mut tail);
        assert!(
            tail.iter().all(|s| s.abs() < 1e-9),
            "cleared reverb must output silence for silent input"
        );
    }

    /// Channels are independent networks: feeding channel 0 leaves
    /// channel 1 silent.
    #[test]
    fn test_channels_are_independent() {
        let mut reverb = Reverb::new(2, 44100.0);
        reverb.set_parameters(&wet_only_params());

        let mut fed = vec![0.0_f32; 2048];
        fed[0] = 1.0;
        reverb.process_channel(0, &mut fed);

        let mut unfed = vec![0.0_f32; 2048];
        reverb.process_channel(1, &mut unfed);
        assert!(
            unfed.iter().all(|s| s.abs() < 1e-9),
            "unfed channel must stay silent"
        );
    }
}
