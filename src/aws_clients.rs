use crate::config::Config;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use tracing;

/// Shared SDK configuration for the caption store.
///
/// Region and the optional LocalStack endpoint come from `Config`;
/// credentials come from the default provider chain.
pub async fn create_sdk_config(config: &Config) -> SdkConfig {
    let region = Region::new(config.aws_region.clone());
    tracing::info!(sdk_region = %config.aws_region, "Setting SDK region");

    let mut config_loader = aws_config::defaults(BehaviorVersion::latest()).region(region);

    if let Some(endpoint_url) = &config.endpoint_url {
        tracing::info!(%endpoint_url, "Using DynamoDB endpoint override");
        config_loader = config_loader.endpoint_url(endpoint_url);
    } else {
        tracing::info!("Using default DynamoDB endpoint");
    }

    config_loader.load().await
}

pub fn create_dynamodb_client(sdk_config: &SdkConfig) -> DynamoDbClient {
    DynamoDbClient::new(sdk_config)
}
