//! Stemcell actions.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use warden_cpi_id::StemcellCid;

use crate::dispatch::Action;
use crate::error::{CpiError, ResultExt};
use crate::stemcell::StemcellStore;

/// `create_stemcell(image_path, cloud_properties) -> stemcell id`
pub struct CreateStemcell {
    store: Arc<StemcellStore>,
}

impl CreateStemcell {
    pub fn new(store: Arc<StemcellStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for CreateStemcell {
    type Args = (String, Value);
    type Output = StemcellCid;

    async fn run(&self, args: Self::Args) -> Result<StemcellCid, CpiError> {
        let (image_path, _cloud_properties) = args;

        let stemcell = self
            .store
            .import_from_path(Path::new(&image_path))
            .cloud_context("Importing stemcell")?;

        Ok(stemcell.id().clone())
    }
}

/// `delete_stemcell(stemcell_id)`; deleting an absent stemcell succeeds.
pub struct DeleteStemcell {
    store: Arc<StemcellStore>,
}

impl DeleteStemcell {
    pub fn new(store: Arc<StemcellStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for DeleteStemcell {
    type Args = (StemcellCid,);
    type Output = ();

    async fn run(&self, args: Self::Args) -> Result<(), CpiError> {
        let (id,) = args;

        self.store
            .delete(&id)
            .cloud_context(format!("Deleting stemcell '{id}'"))?;

        info!(stemcell_id = %id, "Deleted stemcell");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::fixture::Fixture;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_stemcell_rejects_missing_image() {
        let fixture = Fixture::new();
        let action = CreateStemcell::new(fixture.stemcells.clone());

        let err = action
            .run(("/nonexistent/stemcell.tgz".to_string(), json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generic);
        assert!(err.message().starts_with("Importing stemcell: "));
    }

    #[tokio::test]
    async fn test_delete_stemcell_twice() {
        let fixture = Fixture::new();
        let id = fixture.seed_stemcell("sc-existing");
        let action = DeleteStemcell::new(fixture.stemcells.clone());

        action.run((id.clone(),)).await.unwrap();
        action.run((id.clone(),)).await.unwrap();
        assert!(fixture.stemcells.lookup(&id).is_err());
    }
}
