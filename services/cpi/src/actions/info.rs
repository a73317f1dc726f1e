//! Capability reporting for the director.

use async_trait::async_trait;
use serde::Serialize;

use crate::dispatch::Action;
use crate::error::CpiError;

/// Stemcell formats this CPI can import.
const STEMCELL_FORMATS: &[&str] = &["warden-tar", "general-tar"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoResult {
    pub stemcell_formats: Vec<&'static str>,
}

/// Reports CPI capabilities.
pub struct Info;

#[async_trait]
impl Action for Info {
    type Args = ();
    type Output = InfoResult;

    async fn run(&self, _: ()) -> Result<InfoResult, CpiError> {
        Ok(InfoResult {
            stemcell_formats: STEMCELL_FORMATS.to_vec(),
        })
    }
}
