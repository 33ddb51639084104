//! Upgrade command - update an existing release from a release document

use std::path::Path;

use terrahelm_helm::Action;

use crate::config::ProviderSettings;
use crate::error::Result;

/// Run the upgrade command
pub async fn run(settings: &ProviderSettings, file: &Path) -> Result<()> {
    super::reconcile(settings, file, Action::Update, "Upgrading").await
}
