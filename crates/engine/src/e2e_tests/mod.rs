//! End-to-end turn scenarios over in-memory adapters.
//!
//! Every scenario pins the oracle replies (in call order) and the d100
//! rolls (in consumption order), so each run is fully deterministic.

mod accessibility_tests;
mod suspense_tests;
mod turn_flow_tests;
