//! Install command - create a release from a release document

use std::path::Path;

use terrahelm_helm::Action;

use crate::config::ProviderSettings;
use crate::error::Result;

/// Run the install command
pub async fn run(settings: &ProviderSettings, file: &Path) -> Result<()> {
    super::reconcile(settings, file, Action::Create, "Installing").await
}
