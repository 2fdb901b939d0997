//! Call-frame tracking and trace capture.
//!
//! The runtime keeps a thread-local stack of named frames. Hook
//! primitives, component trampolines, and user hook functions each push
//! a frame for the duration of their call, so `capture` can render a
//! trace that looks like what the execution engine would report:
//! innermost frame first, one `at name (file:line:col)` line per frame.
//! Consumers treat the trace as an opaque blob and parse it back out
//! with their own heuristics.

use std::cell::RefCell;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq)]
struct FrameRecord {
    name: String,
    file: String,
    line: u32,
    column: u32,
}

thread_local! {
    static FRAMES: RefCell<Vec<FrameRecord>> = const { RefCell::new(Vec::new()) };
}

/// Keeps a frame on the stack until dropped.
#[must_use = "the frame pops when the guard drops"]
pub struct FrameGuard {
    _priv: (),
}

/// Push a frame. Prefer the [`frame!`](crate::frame) macro at user call
/// sites; it fills in the source location.
pub fn frame(name: &str, file: &str, line: u32, column: u32) -> FrameGuard {
    FRAMES.with(|frames| {
        frames.borrow_mut().push(FrameRecord {
            name: name.to_string(),
            file: file.to_string(),
            line,
            column,
        });
    });
    FrameGuard { _priv: () }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            frames.borrow_mut().pop();
        });
    }
}

/// Opaque captured trace in the engine's text format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace(pub String);

/// Snapshot the live stack, innermost frame first.
pub fn capture() -> Trace {
    FRAMES.with(|frames| {
        let frames = frames.borrow();
        let mut out = String::from("trace:\n");
        for record in frames.iter().rev() {
            let _ = writeln!(
                out,
                "    at {} ({}:{}:{})",
                record.name, record.file, record.line, record.column
            );
        }
        Trace(out)
    })
}

/// Current stack depth.
pub fn depth() -> usize {
    FRAMES.with(|frames| frames.borrow().len())
}

/// Push a frame named after the enclosing function-like scope,
/// recording the macro invocation's source location.
#[macro_export]
macro_rules! frame {
    ($name:expr) => {
        $crate::stack::frame($name, file!(), line!(), column!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_pop_on_drop() {
        assert_eq!(depth(), 0);
        {
            let _outer = frame("outer", "a.rs", 1, 1);
            assert_eq!(depth(), 1);
            {
                let _inner = frame("inner", "a.rs", 2, 1);
                assert_eq!(depth(), 2);
            }
            assert_eq!(depth(), 1);
        }
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_capture_lists_innermost_first() {
        let _outer = frame("outer", "a.rs", 10, 5);
        let _inner = frame("inner", "b.rs", 20, 9);
        let trace = capture();
        let lines: Vec<&str> = trace.0.lines().collect();
        assert_eq!(lines[0], "trace:");
        assert_eq!(lines[1], "    at inner (b.rs:20:9)");
        assert_eq!(lines[2], "    at outer (a.rs:10:5)");
    }

    #[test]
    fn test_frame_macro_records_location() {
        let _guard = crate::frame!("here");
        let trace = capture();
        assert!(trace.0.contains("at here ("));
        assert!(trace.0.contains("stack.rs:"));
    }
}
