//! # Delay Buffer (multi-channel ring store)
//!
//! A fixed-capacity circular buffer holding the recent sample history for
//! every audio channel. It is the memory behind the feedback delay: the
//! engine writes each processed block into the ring and reads blocks back
//! out from a position `delay_samples` behind the shared write cursor.
//!
//! ## The wrap-split
//!
//! Every operation here copies a contiguous block of `len` samples starting
//! at some ring position. When `position + len` runs past the end of the
//! ring, the copy splits into two contiguous segments:
//!
//! ```text
//! [position, capacity)   then   [0, remainder)
//! ```
//!
//! That split is implemented once, in [`wrap_spans`], and reused by every
//! directional copy (host→ring, ring→host, feedback add). Keeping it in one
//! place is what makes the ring arithmetic testable in isolation.
//!
//! ## Gain ramps
//!
//! The two inbound copies take a `gain_start`/`gain_end` pair and apply a
//! linear ramp across the block. The feedback level is sampled once per
//! block, so without the ramp every feedback change would land as a step at
//! a block boundary and click. Ramping from the previous block's value to
//! the current one keeps the loop gain continuous.
//!
//! The buffer is allocated once, at prepare time, and never resized while
//! audio is flowing. Real-time processing must not allocate.

/// Per-channel circular sample store with wrap-aware block copies.
pub struct DelayBuffer {
    /// One ring of `capacity` samples per channel, all starting at silence.
    channels: Vec<Vec<f32>>,

    /// Ring length in samples. Cached so the modular arithmetic reads
    /// clearly and to guarantee every row has the same length.
    capacity: usize,
}

/// One contiguous segment of a possibly-wrapping copy:
/// `(ring_start, block_offset, len)`.
type Span = (usize, usize, usize);

/// Split a `len`-sample copy starting at `position` into at most two
/// contiguous segments. The second segment has `len == 0` when no wrap
/// occurs.
#[inline]
fn wrap_spans(capacity: usize, position: usize, len: usize) -> [Span; 2] {
    let first = len.min(capacity - position);
    [(position, 0, first), (0, first, len - first)]
}

impl DelayBuffer {
    /// Create a buffer of `num_channels` rings, each `capacity` samples
    /// long, filled with silence.
    ///
    /// `capacity` must be provisioned for the maximum delay the control
    /// surface can request; the engine validates that at prepare time,
    /// outside the real-time path.
    pub fn new(num_channels: usize, capacity: usize) -> Self {
        assert!(capacity > 0, "delay buffer capacity must be non-zero");
        Self {
            channels: (0..num_channels).map(|_| vec![0.0; capacity]).collect(),
            capacity,
        }
    }

    /// Ring length in samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of allocated channel rings.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Copy `dst.len()` contiguous samples out of the ring, starting at
    /// `position` and wrapping transparently past the end.
    pub fn read_into(&self, channel: usize, position: usize, dst: &mut [f32]) {
        debug_assert!(position < self.capacity);
        debug_assert!(dst.len() <= self.capacity);

        let row = &self.channels[channel];
        for (ring_start, offset, len) in wrap_spans(self.capacity, position, dst.len()) {
            if len == 0 {
                continue;
            }
            dst[offset..offset + len].copy_from_slice(&row[ring_start..ring_start + len]);
        }
    }

    /// Copy `src` into the ring at `position`, replacing what was there,
    /// with a linear gain ramp from `gain_start` to `gain_end` across the
    /// block.
    pub fn write_from(
        &mut self,
        channel: usize,
        position: usize,
        src: &[f32],
        gain_start: f32,
        gain_end: f32,
    ) {
        debug_assert!(position < self.capacity);
        debug_assert!(src.len() <= self.capacity);

        let increment = ramp_increment(gain_start, gain_end, src.len());
        let row = &mut self.channels[channel];
        for (ring_start, offset, len) in wrap_spans(self.capacity, position, src.len()) {
            for i in 0..len {
                let gain = gain_start + increment * (offset + i) as f32;
                row[ring_start + i] = src[offset + i] * gain;
            }
        }
    }

    /// Add `src` into the ring at `position`, accumulating on top of the
    /// existing contents, with the same linear gain ramp as
    /// [`write_from`](Self::write_from). This is the feedback add: the
    /// delayed signal re-enters the ring scaled by the feedback level.
    pub fn add_from(
        &mut self,
        channel: usize,
        position: usize,
        src: &[f32],
        gain_start: f32,
        gain_end: f32,
    ) {
        debug_assert!(position < self.capacity);
        debug_assert!(src.len() <= self.capacity);

        let increment = ramp_increment(gain_start, gain_end, src.len());
        let row = &mut self.channels[channel];
        for (ring_start, offset, len) in wrap_spans(self.capacity, position, src.len()) {
            for i in 0..len {
                let gain = gain_start + increment * (offset + i) as f32;
                row[ring_start + i] += src[offset + i] * gain;
            }
        }
    }

    /// Zero every channel's history. Called at prepare/reset so stale
    /// echoes never bleed into a fresh session.
    pub fn clear(&mut self) {
        for row in &mut self.channels {
            row.fill(0.0);
        }
    }
}

/// Per-sample gain step for a linear ramp over `len` samples. The gain at
/// sample `i` is `gain_start + increment * i`; the final sample lands one
/// step short of `gain_end`, which the next block's ramp picks up from.
#[inline]
pub(crate) fn ramp_increment(gain_start: f32, gain_end: f32, len: usize) -> f32 {
    if len == 0 {
        0.0
    } else {
        (gain_end - gain_start) / len as f32
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
