//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the simulated host and MCU board. No real hardware required.

mod dispatcher_tests;
mod load_scenarios;
mod mock_hw;
mod service_tests;
