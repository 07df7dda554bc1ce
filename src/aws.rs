//! Shared AWS client setup.

use aws_config::BehaviorVersion;

use crate::prelude::*;

/// Load AWS configuration using the standard conventions: environment
/// variables, credential files and (on EC2/Lambda) instance metadata.
/// Both the Textract and Bedrock clients are built from this one config.
pub async fn load_aws_config() -> Result<aws_config::SdkConfig> {
    Ok(aws_config::load_defaults(BehaviorVersion::v2025_01_17()).await)
}
