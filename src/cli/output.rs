use crate::deploy::DeployError;
use std::io::Write;

/// Prints a failed command's error, its cause chain and any remediation hint.
pub fn print_error(out: &mut dyn Write, error: &DeployError) {
    let _ = writeln!(out, "ERROR: {error}");

    let message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.contains(&cause_message) {
            let _ = writeln!(out, "  caused by: {cause_message}");
        }
        source = cause.source();
    }

    if let Some(remediation) = error.remediation() {
        let _ = writeln!(out);
        let _ = writeln!(out, "To fix this: {remediation}");
    }
}
