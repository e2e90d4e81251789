use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use anyhow::Result;

use crate::completer::CompletionMatcher;

/// Shared writable handle commands print to.
///
/// Execution of a submitted line is single-threaded, so a shared mutable
/// writer is enough; the pipe executor hands the same handle to a running
/// command and to the sink feeding it.
pub type Output = Rc<RefCell<dyn Write>>;

/// Callback a streaming command hands back to receive upstream lines.
pub type LineCallback = Box<dyn FnMut(&str)>;

/// Wrap any writer into an [`Output`] handle.
pub fn output_from<W: Write + 'static>(writer: W) -> Output {
    Rc::new(RefCell::new(writer))
}

/// Object-safe trait for any command the shell can run.
///
/// Commands are registered by name and receive the full invocation line,
/// including their own name, so they can parse flags with whatever grammar
/// they declare (usually an `ArgsSpec`).
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    /// One-line invocation syntax, shown by `help` and on parse failures.
    fn usage(&self) -> String;

    fn short_description(&self) -> String;

    /// Run the command to completion, writing results to `out` and problems
    /// to `err`.
    fn execute(&self, line: &str, out: Output, err: Output) -> Result<()>;

    /// Streaming entry point for pipelines.
    ///
    /// A command that can process its input line by line returns a callback
    /// here; the executor then feeds it upstream output as it is produced
    /// instead of buffering everything first. The default is non-streaming.
    fn pipe(&self, _line: &str, _out: Output, _err: Output) -> Option<LineCallback> {
        None
    }

    /// Completion matchers for this command's arguments. They become the
    /// children of the command's name node in the shell completion tree.
    fn completers(&self) -> Vec<CompletionMatcher> {
        Vec::new()
    }
}
