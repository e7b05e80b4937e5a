//! External collaborators consumed by the relay
//!
//! Each client sits behind a small trait so the processor and the
//! extraction strategies can be exercised without the live services.

pub mod interpreter;
pub mod media_store;
pub mod task_board;
pub mod transcriber;

pub use interpreter::{HttpInterpreter, Interpreter};
pub use media_store::{LocalMediaStore, MediaStore};
pub use task_board::{CardRef, HttpTaskBoard, TaskBoard};
pub use transcriber::{HttpTranscriber, Transcriber};
