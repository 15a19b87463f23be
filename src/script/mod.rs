pub mod interpreter;

pub use interpreter::{ScriptOutcome, run_script};
