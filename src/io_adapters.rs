//! Line-oriented plumbing between pipeline stages.
//!
//! A stage writes bytes to a [`SinkWriter`]; the writer cuts them into lines
//! and pushes each one into the [`LineSink`] feeding the next stage. Sinks
//! either stream lines straight into a downstream command's callback or
//! buffer them until the upstream stage is done. Closing a sink runs whatever
//! work was deferred and cascades the close down the rest of the pipeline.

use std::cell::RefCell;
use std::io::{Result as IoResult, Write};
use std::rc::Rc;
use std::sync::Arc;

use crate::command::{Command, LineCallback, Output};

/// Receives the line output of one pipeline stage.
pub trait LineSink {
    fn push_line(&mut self, line: &str);

    /// The upstream stage is finished; flush deferred work and close the rest
    /// of the chain.
    fn close(&mut self);
}

pub type SharedLineSink = Rc<RefCell<dyn LineSink>>;
pub type SharedSinkWriter = Rc<RefCell<SinkWriter>>;

/// A `Write` adapter that splits its input into lines for a [`LineSink`].
pub struct SinkWriter {
    downstream: SharedLineSink,
    buf: Vec<u8>,
}

impl SinkWriter {
    pub fn new(downstream: SharedLineSink) -> SharedSinkWriter {
        Rc::new(RefCell::new(Self { downstream, buf: Vec::new() }))
    }

    /// Push any unterminated final line and close the downstream sink.
    pub fn finish(&mut self) {
        if !self.buf.is_empty() {
            let line = String::from_utf8_lossy(&self.buf).into_owned();
            self.buf.clear();
            self.downstream.borrow_mut().push_line(&line);
        }
        self.downstream.borrow_mut().close();
    }
}

impl Write for SinkWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.extend_from_slice(data);
        while let Some(at) = self.buf.iter().position(|&byte| byte == b'\n') {
            let rest = self.buf.split_off(at + 1);
            self.buf.pop();
            let line = String::from_utf8_lossy(&self.buf).into_owned();
            self.buf = rest;
            self.downstream.borrow_mut().push_line(&line);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

/// Feeds upstream lines straight into a streaming command's callback.
pub struct StreamSink {
    callback: Option<LineCallback>,
    next: Option<SharedSinkWriter>,
}

impl StreamSink {
    pub fn new(callback: LineCallback, next: Option<SharedSinkWriter>) -> SharedLineSink {
        Rc::new(RefCell::new(Self { callback: Some(callback), next }))
    }
}

impl LineSink for StreamSink {
    fn push_line(&mut self, line: &str) {
        if let Some(callback) = &mut self.callback {
            callback(line);
        }
    }

    fn close(&mut self) {
        // dropping the callback tells the command its input ended
        self.callback = None;
        if let Some(next) = self.next.take() {
            next.borrow_mut().finish();
        }
    }
}

/// Buffers upstream lines and runs a non-streaming command once the upstream
/// stage finished, with the joined lines appended to its invocation text.
pub struct BufferSink {
    command: Arc<dyn Command>,
    invocation: String,
    lines: Vec<String>,
    out: Output,
    err: Output,
    next: Option<SharedSinkWriter>,
}

impl BufferSink {
    pub fn new(
        command: Arc<dyn Command>,
        invocation: String,
        out: Output,
        err: Output,
        next: Option<SharedSinkWriter>,
    ) -> SharedLineSink {
        Rc::new(RefCell::new(Self {
            command,
            invocation,
            lines: Vec::new(),
            out,
            err,
            next,
        }))
    }
}

impl LineSink for BufferSink {
    fn push_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn close(&mut self) {
        let line = if self.lines.is_empty() {
            self.invocation.clone()
        } else {
            format!("{} {}", self.invocation, self.lines.join("\n"))
        };
        if let Err(error) = self
            .command
            .execute(&line, self.out.clone(), self.err.clone())
        {
            let _ = writeln!(self.err.borrow_mut(), "{error}");
        }
        if let Some(next) = self.next.take() {
            next.borrow_mut().finish();
        }
    }
}

/// Memory-backed writer for capturing command output.
pub struct MemWriter {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl MemWriter {
    /// Create a writer handle plus the shared buffer behind it, so the caller
    /// can read collected bytes after command execution.
    pub fn with_handle() -> (Output, Rc<RefCell<Vec<u8>>>) {
        let buf = Rc::new(RefCell::new(Vec::new()));
        let writer = MemWriter { buf: buf.clone() };
        (Rc::new(RefCell::new(writer)), buf)
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}
