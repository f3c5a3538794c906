use crate::{
    aws_clients::{create_dynamodb_client, create_sdk_config},
    config::{Config, IdentityBackend, StoreBackend},
    domain::{GalleryRepository, IdentityProvider},
    errors::AppError,
    gallery::GalleryAssembler,
    identity::HostedIdentityProvider,
    memory::{InMemoryGalleryRepository, InMemoryIdentityProvider},
    repositories::{DynamoDbGalleryRepository, GALLERY_INDEX, GALLERY_PK},
    AppState,
};
use aws_sdk_dynamodb::{
    error::SdkError as DynamoSdkError,
    types::{
        AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType, Projection,
        ProjectionType, ScalarAttributeType,
    },
    Client as DynamoDbClient,
};
use std::sync::Arc;
use tracing;

fn attribute(name: &str) -> Result<AttributeDefinition, AppError> {
    Ok(AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()?)
}

fn key(name: &str, key_type: KeyType) -> Result<KeySchemaElement, AppError> {
    Ok(KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()?)
}

/// Creates a DynamoDB table if it doesn't exist.
async fn create_table_if_not_exists(
    client: &DynamoDbClient,
    table_name: &str,
    with_gallery_index: bool,
) -> Result<(), AppError> {
    let mut request = client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(attribute("id")?)
        .key_schema(key("id", KeyType::Hash)?)
        .billing_mode(BillingMode::PayPerRequest);

    if with_gallery_index {
        let index = GlobalSecondaryIndex::builder()
            .index_name(GALLERY_INDEX)
            .key_schema(key(GALLERY_PK, KeyType::Hash)?)
            .key_schema(key("created_datetime_utc", KeyType::Range)?)
            .projection(Projection::builder().projection_type(ProjectionType::All).build())
            .build()?;
        request = request
            .attribute_definitions(attribute(GALLERY_PK)?)
            .attribute_definitions(attribute("created_datetime_utc")?)
            .global_secondary_indexes(index);
    }

    match request.send().await {
        Ok(_) => {
            tracing::info!("Startup: Table '{}' created successfully or setup initiated.", table_name);
            Ok(())
        }
        Err(e) => {
            if let DynamoSdkError::ServiceError(service_err) = &e {
                if service_err.err().is_resource_in_use_exception() {
                    tracing::info!("Startup: Table '{}' already exists, no action needed.", table_name);
                    Ok(())
                } else {
                    let context = format!("Startup: Service error creating DynamoDB table '{}'", table_name);
                    tracing::error!("{}: {:?}", context, service_err);
                    Err(AppError::InitError(format!("{}: {}", context, e)))
                }
            } else {
                let context = format!("Startup: SDK error creating DynamoDB table '{}'", table_name);
                tracing::error!("{}: {}", context, e);
                Err(AppError::InitError(format!("{}: {}", context, e)))
            }
        }
    }
}

/// Initializes the `captions` and `images` tables.
pub async fn init_resources(client: &DynamoDbClient, config: &Config) -> Result<(), AppError> {
    tracing::info!("Startup: Initializing DynamoDB tables...");
    create_table_if_not_exists(client, &config.captions_table, true).await?;
    create_table_if_not_exists(client, &config.images_table, false).await?;
    tracing::info!("Startup: DynamoDB table initialization complete.");
    Ok(())
}

/// Builds the shared application state for the configured backends.
pub async fn build_state(config: &Config) -> Result<Arc<AppState>, AppError> {
    let repo: Arc<dyn GalleryRepository> = match config.store_backend {
        StoreBackend::DynamoDb => {
            let sdk_config = create_sdk_config(config).await;
            let client = create_dynamodb_client(&sdk_config);
            init_resources(&client, config).await?;
            Arc::new(DynamoDbGalleryRepository::new(
                client,
                config.captions_table.clone(),
                config.images_table.clone(),
            ))
        }
        StoreBackend::Memory => {
            tracing::warn!("Startup: Using in-memory caption store, data is lost on exit");
            Arc::new(InMemoryGalleryRepository::new())
        }
    };

    let identity: Arc<dyn IdentityProvider> = match &config.identity_backend {
        IdentityBackend::Hosted { auth_url, api_key } => {
            Arc::new(HostedIdentityProvider::new(auth_url.clone(), api_key.clone()))
        }
        IdentityBackend::Memory { demo_user_email } => {
            tracing::warn!(%demo_user_email, "Startup: Using in-memory identity provider");
            Arc::new(InMemoryIdentityProvider::new(demo_user_email))
        }
    };

    Ok(Arc::new(AppState {
        gallery: GalleryAssembler::new(repo.clone(), config.page_size),
        repo,
        identity,
        oauth_provider: config.oauth_provider.clone(),
        public_origin: config.public_origin.clone(),
    }))
}
