//! Read command - report the current state of a release

use terrahelm_helm::MissingRelease;

use crate::config::ProviderSettings;
use crate::display;
use crate::error::Result;

/// Run the read command
///
/// As a data source a missing release is not an error: the identity-only
/// state is printed with status `unknown`.
pub async fn run(settings: &ProviderSettings, name: &str, namespace: &str, data_source: bool) -> Result<()> {
    let missing = if data_source {
        MissingRelease::Tolerate
    } else {
        MissingRelease::Error
    };

    let client = super::helm_client(settings);
    let state = client.read(name, namespace, missing).await?;

    display::done(&state);
    display::print_state(&state)
}
