// src/peripherals/mod.rs
//
// Owned handles for everything outside the process: motor, advisory panel,
// speech, camera.

pub mod announcer;
pub mod display;
pub mod frame_source;
pub mod motor;
pub mod speech;

pub use announcer::Announcer;
pub use display::{ConsoleDisplay, DisplayHandle, DisplayState};
pub use frame_source::{FrameSource, ImageSequenceSource};
pub use motor::{DriveCommand, LoggingMotor, MotorDriver};
pub use speech::{HttpSpeech, SilentSpeech, SpeechBackend};
