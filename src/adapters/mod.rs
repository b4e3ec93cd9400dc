//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements                      | Connects to              |
//! |------------|---------------------------------|--------------------------|
//! | `log_sink` | EventSink                       | `log` facade             |
//! | `sim`      | SensorPort, MotionPort, Reactor | Scripted virtual host    |
//! |            | SyncContext, DispatchAggregator | Simulated MCU channels   |

pub mod log_sink;
pub mod sim;
