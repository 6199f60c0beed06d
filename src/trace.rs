//! Leveled, indentation-aware tracing for the driver's `Trace*` flags
//! (§6 "Driver flag table"), the direct descendant of the original's
//! `Logger` (indent depth, `log`/`log_enter`/`log_exit`). No external
//! logging crate is introduced — the teacher crate has none in its
//! dependency graph, and this tracer's whole job is "write an indented
//! line to stderr when a flag is set", which doesn't need one.

use std::cell::Cell;

const INDENT_SIZE: usize = 4;

/// One logical trace stream, gated by a single boolean flag. The driver
/// owns one `Trace` per `Trace*` flag rather than a single shared
/// logger, since each flag governs an independent phase of the
/// pipeline and their indentation depths are unrelated.
pub struct Trace {
    enabled: bool,
    depth: Cell<usize>,
}

impl Trace {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, depth: Cell::new(0) }
    }

    fn indent(&self) -> String {
        " ".repeat(self.depth.get() * INDENT_SIZE)
    }

    /// Logs `msg` at the current indentation depth.
    pub fn log(&self, msg: &str) {
        if self.enabled {
            eprintln!("{}{msg}", self.indent());
        }
    }

    /// Logs `msg`, then increases indentation for subsequent calls —
    /// pair with [`Trace::log_exit`] around one nested phase.
    pub fn log_enter(&self, msg: &str) {
        self.log(msg);
        self.depth.set(self.depth.get() + 1);
    }

    /// Decreases indentation, then logs `msg` at the shallower depth.
    pub fn log_exit(&self, msg: &str) {
        self.depth.set(self.depth.get().saturating_sub(1));
        self.log(msg);
    }
}
