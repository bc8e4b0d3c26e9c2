//! Error reporting through miette
//!
//! Compiled handlers carry no source text, so reports hold the message,
//! error code and help line only.

use miette::{GraphicalReportHandler, GraphicalTheme, MietteDiagnostic, Report};

use crate::{CompileError, Diagnostic, Severity};

/// Convert a compile error into a miette [`Report`].
///
/// # Example
/// ```
/// use quill::{CompileError, report};
///
/// let report = report(&CompileError::EmptyModule);
/// assert_eq!(report.to_string(), "module contains no items to compile");
/// ```
pub fn report(error: &CompileError) -> Report {
    Report::new(to_miette(&error.to_diagnostic()))
}

/// Render a diagnostic to a String without color codes (useful for tests,
/// logs, etc.)
pub fn render_diagnostic(diagnostic: &Diagnostic) -> String {
    let mut out = String::new();
    let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor());
    // Writing into a String cannot fail.
    let _ = handler.render_report(&mut out, &to_miette(diagnostic));
    out
}

fn to_miette(diagnostic: &Diagnostic) -> MietteDiagnostic {
    let mut out = MietteDiagnostic::new(diagnostic.message.clone()).with_severity(
        match diagnostic.severity {
            Severity::Error => miette::Severity::Error,
            Severity::Warning => miette::Severity::Warning,
            Severity::Info => miette::Severity::Advice,
        },
    );
    if let Some(code) = &diagnostic.code {
        out = out.with_code(code.clone());
    }
    if let Some(help) = &diagnostic.help {
        out = out.with_help(help.clone());
    }
    out
}
