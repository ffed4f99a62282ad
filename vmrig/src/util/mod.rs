mod process;
mod spinner;

pub use process::{is_process_alive, is_same_process, read_pid_file, terminate_process};
pub use spinner::Spinner;
