//! CLI commands

pub mod install;
pub mod read;
pub mod uninstall;
pub mod upgrade;

use std::path::Path;
use std::sync::Arc;

use terrahelm_helm::{Action, HelmClient, ProcessRunner};
use terrahelm_source::{Fetcher, GetterFetcher, GitCli, GitClient};

use crate::config::{ProviderSettings, load_release};
use crate::display;
use crate::error::Result;

/// Client wired to the real helm and git binaries
pub(crate) fn helm_client(settings: &ProviderSettings) -> HelmClient {
    let git: Arc<dyn GitClient> = Arc::new(GitCli::new(settings.git_bin_path.clone()));
    let fetcher: Arc<dyn Fetcher> = Arc::new(GetterFetcher::new(git.clone()));
    HelmClient::new(settings.client_config(), Arc::new(ProcessRunner), fetcher, git)
}

/// Load a release document, reconcile it and print the resulting state
pub(crate) async fn reconcile(
    settings: &ProviderSettings,
    file: &Path,
    action: Action,
    verb: &str,
) -> Result<()> {
    let spec = load_release(file, settings.default_retry)?;
    display::step(verb, &spec.id());

    let client = helm_client(settings);
    let state = client.apply(&spec, action).await?;

    display::done(&state);
    display::print_state(&state)
}
