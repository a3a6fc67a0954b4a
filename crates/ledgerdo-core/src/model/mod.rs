pub mod task;

pub use task::{Address, ParseEnumError, Priority, Task, TaskId, from_unix_seconds};
