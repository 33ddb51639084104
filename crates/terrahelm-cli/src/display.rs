//! Output formatting
//!
//! Release state goes to stdout as JSON; human-facing status lines go to
//! stderr so the JSON stays pipeable.

use console::style;
use terrahelm_core::{ReleaseState, ReleaseStatus};

use crate::error::Result;

/// Print the state as pretty JSON on stdout
pub fn print_state(state: &ReleaseState) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}

/// `→ Installing release web/nginx`
pub fn step(verb: &str, id: &str) {
    eprintln!(
        "{} {} release {}",
        style("→").blue().bold(),
        verb,
        style(id).cyan()
    );
}

/// One-line summary of a release state
pub fn summary(state: &ReleaseState) -> String {
    if state.revision.is_empty() {
        return format!("{} not found", state.id);
    }
    let chart = if state.chart_version.is_empty() {
        state.chart_name.clone()
    } else {
        format!("{}-{}", state.chart_name, state.chart_version)
    };
    format!(
        "{} revision {} ({}) {}",
        state.id, state.revision, state.status, chart
    )
}

/// `✓ web/nginx revision 3 (deployed) nginx-13.2.1`
pub fn done(state: &ReleaseState) {
    let marker = match state.status {
        ReleaseStatus::Deployed => style("✓").green().bold(),
        ReleaseStatus::Failed => style("✗").red().bold(),
        _ => style("•").yellow().bold(),
    };
    eprintln!("{} {}", marker, summary(state));
}
