use std::io::{self, Write};

use serde::Serialize;
use serde_json::json;

use crate::error::CliError;

/// Writes one JSON document to stdout.
pub fn render<T: Serialize>(value: &T, pretty: bool) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{payload}")?;
    stdout.flush()?;
    Ok(())
}

/// Failure object for errors raised before an acquisition could run.
pub fn render_error(error: &CliError) {
    let payload = json!({
        "success": false,
        "error": error.to_string(),
    });
    // stdout may already be gone; the exit code still reports the failure.
    if render(&payload, false).is_err() {
        eprintln!("error: {error}");
    }
}
