//! Pipeline stages for card generation.
//!
//! Each submodule implements exactly one concern, and data flows one way:
//!
//! ```text
//! request ──▶ gate ──▶ extract ──▶ (provider client) ──▶ parse
//! (input)   (links)   (4 routes)    (generation)        (validate)
//! ```
//!
//! 1. [`gate`]    — link reachability, robots, paywall/auth classification
//! 2. [`extract`] — source material → normalized text
//! 3. [`parse`]   — generated text → validated cards
//! 4. [`fetch`]   — the HTTP edge behind a trait, shared by gate and
//!    extractors so tests can count and script every network call
//! 5. [`robots`]  — minimal robots.txt evaluation for the gate

pub mod extract;
pub mod fetch;
pub mod gate;
pub mod parse;
pub mod robots;
