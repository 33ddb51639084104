//! Uninstall command - remove a release from the cluster

use console::style;
use terrahelm_core::release_id;

use crate::config::ProviderSettings;
use crate::display;
use crate::error::Result;

/// Run the uninstall command
pub async fn run(settings: &ProviderSettings, name: &str, namespace: &str) -> Result<()> {
    let id = release_id(namespace, name);
    display::step("Uninstalling", &id);

    super::helm_client(settings).delete(name, namespace).await?;

    eprintln!("{} Uninstalled {}", style("✓").green().bold(), style(&id).cyan());
    Ok(())
}
