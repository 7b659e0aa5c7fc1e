//! User-facing diagnostic messages.
//!
//! A single `Diagnostics` sink is threaded through every link stage.
//! Stages report as many problems as they can find before failing, so a
//! single run surfaces all diagnostics at once; the sink counts errors
//! and the driver checks the count between stages.

use std::cell::{Cell, RefCell};
use std::fmt;

use crate::core::value::Source;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A single diagnostic message with an optional source location.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub source: Option<Source>,
}

impl Diagnostic {
    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
                Severity::Note => "\x1b[1;36mnote\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note => "note",
            }
        };

        match &self.source {
            Some(source) => format!("{}: {}: {}", source, severity_str, self.message),
            None => format!("{}: {}", severity_str, self.message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// The sink all stages report through.
///
/// Writes to stderr immediately. Interior mutability keeps the sink
/// shareable by plain reference across stages that only borrow the
/// link context.
#[derive(Debug)]
pub struct Diagnostics {
    color: bool,
    errors: Cell<usize>,
    warnings: Cell<usize>,
    /// Collects instead of printing; used by tests.
    capture: Option<RefCell<Vec<Diagnostic>>>,
}

impl Diagnostics {
    pub fn new(color: bool) -> Self {
        Diagnostics {
            color,
            errors: Cell::new(0),
            warnings: Cell::new(0),
            capture: None,
        }
    }

    /// A sink that records diagnostics instead of printing them.
    pub fn capturing() -> Self {
        Diagnostics {
            color: false,
            errors: Cell::new(0),
            warnings: Cell::new(0),
            capture: Some(RefCell::new(Vec::new())),
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(Severity::Error, None, message.into());
    }

    pub fn error_at(&self, source: &Source, message: impl Into<String>) {
        self.emit(Severity::Error, Some(source.clone()), message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(Severity::Warning, None, message.into());
    }

    pub fn warn_at(&self, source: &Source, message: impl Into<String>) {
        self.emit(Severity::Warning, Some(source.clone()), message.into());
    }

    pub fn note(&self, message: impl Into<String>) {
        self.emit(Severity::Note, None, message.into());
    }

    pub fn note_at(&self, source: &Source, message: impl Into<String>) {
        self.emit(Severity::Note, Some(source.clone()), message.into());
    }

    fn emit(&self, severity: Severity, source: Option<Source>, message: String) {
        match severity {
            Severity::Error => self.errors.set(self.errors.get() + 1),
            Severity::Warning => self.warnings.set(self.warnings.get() + 1),
            Severity::Note => {}
        }

        let diagnostic = Diagnostic {
            severity,
            message,
            source,
        };

        match &self.capture {
            Some(captured) => captured.borrow_mut().push(diagnostic),
            None => eprintln!("{}", diagnostic.format(self.color)),
        }
    }

    /// Number of errors reported so far.
    pub fn error_count(&self) -> usize {
        self.errors.get()
    }

    /// Number of warnings reported so far.
    pub fn warning_count(&self) -> usize {
        self.warnings.get()
    }

    /// Captured diagnostics, if this is a capturing sink.
    pub fn captured(&self) -> Vec<Diagnostic> {
        match &self.capture {
            Some(captured) => captured.borrow().clone(),
            None => Vec::new(),
        }
    }
}
