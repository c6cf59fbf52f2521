//! # DSP (Digital Signal Processing) Primitives
//!
//! The signal-processing building blocks of the effect, kept free of any
//! plugin-framework types so each is unit-testable on its own:
//!
//! - **`delay_buffer`**: the multi-channel ring store holding recent
//!   sample history, with the wrap-split block copies everything else is
//!   built on.
//!
//! - **`delay`**: the feedback delay stage. Reads behind the shared write
//!   cursor, mixes echoes into the block, writes the processed signal
//!   back into the ring.
//!
//! - **`reverb`**: a Freeverb-style comb/all-pass network, applied per
//!   channel after the delay stage.

pub mod delay;
pub mod delay_buffer;
pub mod reverb;
