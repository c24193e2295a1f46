// src/coordination/mod.rs

pub mod coordinator;
pub mod drive_loop;
pub mod messages;
pub mod status;

pub use coordinator::{run_route, Coordinator, CoordinatorOutputs};
pub use drive_loop::PerceptionLoop;
pub use messages::{read_stdin, Inbound, Publisher, StdoutPublisher};
pub use status::{SharedStatus, VehicleStatus};
