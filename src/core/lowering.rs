// This module provides the lowering context: the isolated staging environment an emitter works
// in while translating a program into the low-level module. Each compilation creates its own
// LoweringContext over a bumpalo arena, so interned names and scratch objects share one
// lifetime and are released together. The context owns a diagnostic engine: emitters report
// notes, warnings and errors through it, and registered handlers decide what happens to each.
// The orchestrator installs a handler that only logs and always answers Suppressed, which keeps
// diagnostic severity from ever turning into a compilation failure. Threading is an explicit
// construction option; compilations run it Disabled so many of them can proceed in parallel as
// independent units without each one spawning its own worker threads.

//! Arena-backed lowering context with a diagnostic engine.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Whether the context may use internal worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threading {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoweringOptions {
    pub threading: Threading,
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self { threading: Threading::Disabled }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Note,
    Remark,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Note => "note",
            Severity::Remark => "remark",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self { severity, message: message.into(), location: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn at(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {}: {}", loc, self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Outcome a handler reports for one diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticResult {
    /// Not consumed; the next handler gets it.
    Unhandled,
    /// Consumed and acted upon.
    Handled,
    /// Consumed and deliberately kept from affecting the caller.
    Suppressed,
}

type DiagnosticHandler<'arena> = Box<dyn FnMut(&Diagnostic) -> DiagnosticResult + 'arena>;

/// Counters kept by the context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoweringStats {
    pub diagnostics_emitted: usize,
    pub errors_emitted: usize,
    pub names_interned: usize,
}

/// Staging environment for one lowering.
pub struct LoweringContext<'arena> {
    arena: &'arena Bump,
    options: LoweringOptions,
    handlers: RefCell<Vec<DiagnosticHandler<'arena>>>,
    interned: RefCell<HashMap<String, &'arena str>>,
    stats: RefCell<LoweringStats>,
}

impl<'arena> LoweringContext<'arena> {
    pub fn new(arena: &'arena Bump, options: LoweringOptions) -> Self {
        Self {
            arena,
            options,
            handlers: RefCell::new(Vec::new()),
            interned: RefCell::new(HashMap::new()),
            stats: RefCell::new(LoweringStats::default()),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    pub fn options(&self) -> LoweringOptions {
        self.options
    }

    pub fn is_multithreading_enabled(&self) -> bool {
        self.options.threading == Threading::Enabled
    }

    /// Register a handler; the most recently registered one sees diagnostics first.
    pub fn register_diagnostic_handler<F>(&self, handler: F)
    where
        F: FnMut(&Diagnostic) -> DiagnosticResult + 'arena,
    {
        self.handlers.borrow_mut().push(Box::new(handler));
    }

    /// Route a diagnostic through the handlers and report the first non-`Unhandled` answer.
    ///
    /// Handlers may emit diagnostics or register handlers themselves. While a
    /// dispatch is running its handlers are detached, so a nested diagnostic
    /// only reaches handlers registered during that dispatch.
    pub fn emit_diagnostic(&self, diag: Diagnostic) -> DiagnosticResult {
        {
            let mut stats = self.stats.borrow_mut();
            stats.diagnostics_emitted += 1;
            if diag.severity == Severity::Error {
                stats.errors_emitted += 1;
            }
        }

        let mut handlers = std::mem::take(&mut *self.handlers.borrow_mut());
        let result = handlers
            .iter_mut()
            .rev()
            .map(|handler| handler(&diag))
            .find(|result| *result != DiagnosticResult::Unhandled)
            .unwrap_or(DiagnosticResult::Unhandled);

        // Reattach, keeping anything registered meanwhile as the newest.
        let mut current = self.handlers.borrow_mut();
        let registered = std::mem::replace(&mut *current, handlers);
        current.extend(registered);
        drop(current);

        if result == DiagnosticResult::Unhandled {
            log::warn!("unhandled lowering diagnostic: {}", diag);
        }
        result
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        self.stats.borrow_mut().names_interned += 1;
        interned
    }

    pub fn stats(&self) -> LoweringStats {
        self.stats.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_threading_option() {
        let arena = Bump::new();
        let ctx = LoweringContext::new(&arena, LoweringOptions::default());
        assert!(!ctx.is_multithreading_enabled());

        let ctx = LoweringContext::new(&arena, LoweringOptions { threading: Threading::Enabled });
        assert!(ctx.is_multithreading_enabled());
    }

    #[test]
    fn test_suppressing_handler_sees_every_severity() {
        let seen = Cell::new(0);
        let arena = Bump::new();
        let ctx = LoweringContext::new(&arena, LoweringOptions::default());
        ctx.register_diagnostic_handler(|_| {
            seen.set(seen.get() + 1);
            DiagnosticResult::Suppressed
        });

        assert_eq!(ctx.emit_diagnostic(Diagnostic::error("bad")), DiagnosticResult::Suppressed);
        assert_eq!(ctx.emit_diagnostic(Diagnostic::warning("meh")), DiagnosticResult::Suppressed);
        assert_eq!(seen.get(), 2);

        let stats = ctx.stats();
        assert_eq!(stats.diagnostics_emitted, 2);
        assert_eq!(stats.errors_emitted, 1);
    }

    #[test]
    fn test_latest_handler_first() {
        let arena = Bump::new();
        let ctx = LoweringContext::new(&arena, LoweringOptions::default());
        ctx.register_diagnostic_handler(|_| DiagnosticResult::Handled);
        ctx.register_diagnostic_handler(|d| {
            if d.severity == Severity::Note {
                DiagnosticResult::Suppressed
            } else {
                DiagnosticResult::Unhandled
            }
        });

        assert_eq!(
            ctx.emit_diagnostic(Diagnostic::new(Severity::Note, "n")),
            DiagnosticResult::Suppressed
        );
        assert_eq!(ctx.emit_diagnostic(Diagnostic::error("e")), DiagnosticResult::Handled);
    }

    #[test]
    fn test_handler_may_reenter_context() {
        let arena = Bump::new();
        let ctx = Rc::new(LoweringContext::new(&arena, LoweringOptions::default()));
        let weak = Rc::downgrade(&ctx);
        ctx.register_diagnostic_handler(move |d| {
            if let (Severity::Error, Some(ctx)) = (d.severity, weak.upgrade()) {
                ctx.emit_diagnostic(Diagnostic::new(Severity::Note, "while handling error"));
                ctx.register_diagnostic_handler(|_| DiagnosticResult::Handled);
            }
            DiagnosticResult::Suppressed
        });

        assert_eq!(ctx.emit_diagnostic(Diagnostic::error("e")), DiagnosticResult::Suppressed);
        assert_eq!(ctx.stats().diagnostics_emitted, 2);
        // The handler registered during dispatch now runs first.
        assert_eq!(ctx.emit_diagnostic(Diagnostic::warning("w")), DiagnosticResult::Handled);
    }

    #[test]
    fn test_no_handlers() {
        let arena = Bump::new();
        let ctx = LoweringContext::new(&arena, LoweringOptions::default());
        assert_eq!(ctx.emit_diagnostic(Diagnostic::error("x")), DiagnosticResult::Unhandled);
    }

    #[test]
    fn test_string_interning() {
        let arena = Bump::new();
        let ctx = LoweringContext::new(&arena, LoweringOptions::default());

        let s1 = ctx.intern_str("fusion.1");
        let s2 = ctx.intern_str("fusion.1");
        let s3 = ctx.intern_str("fusion.2");

        assert_eq!(s1.as_ptr(), s2.as_ptr());
        assert_ne!(s1.as_ptr(), s3.as_ptr());
        assert_eq!(ctx.stats().names_interned, 2);
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::warning("slow path").at("fusion.3");
        assert_eq!(d.to_string(), "fusion.3: warning: slow path");
    }
}
