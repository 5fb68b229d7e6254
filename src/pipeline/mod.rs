//! Pipeline stages for migrating the images of one JSON document.
//!
//! Each submodule implements exactly one step, so each is testable on its own
//! and the network-facing ones ([`fetch`], [`crate::store`]) can be swapped
//! for in-memory doubles.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ fetch ──▶ transform/encode ──▶ store ──▶ rewrite ──▶ input
//! (load)    (<img>)     (HTTP)    (unless exempt)      (upload)  (mapping)   (write)
//! ```
//!
//! 1. [`input`]     — load the source JSON; later write `updated_<name>` atomically
//! 2. [`extract`]   — collect `<img src>` URLs from top-level strings, in order
//! 3. [`fetch`]     — download each URL; the only inbound network stage
//! 4. [`transform`] — watermark removal, contrast, grayscale, gamma; CPU-bound,
//!    so the orchestrator runs it in `spawn_blocking`
//! 5. [`encode`]    — pick PNG/JPEG for the transformed file and write it
//! 6. [`throttle`]  — settle delay after each upload
//! 7. [`rewrite`]   — substitute issued URLs into a copy of the document

pub mod encode;
pub mod extract;
pub mod fetch;
pub mod input;
pub mod rewrite;
pub mod throttle;
pub mod transform;
