use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use lambda_http::{run, service_fn, Error, Request};
use std::sync::Arc;
use thesis_shared::config::Config;
use thesis_shared::identity::CognitoIdentityStore;
use thesis_shared::storage::S3Storage;
use thesis_shared::store::DynamoStore;
use thesis_shared::AppState;
use tracing_subscriber::EnvFilter;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .init();

    let config = Config::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        e
    })?;

    // Initialize AWS clients once at startup
    let aws = aws_config::load_from_env().await;

    let store = Arc::new(DynamoStore::new(
        DynamoClient::new(&aws),
        config.table_name.clone(),
    ));
    let identity = Arc::new(CognitoIdentityStore::new(
        CognitoClient::new(&aws),
        config.cognito_client_id.clone(),
        config.cognito_client_secret.clone(),
        config.cognito_user_pool_id.clone(),
    ));
    let storage = Arc::new(S3Storage::new(
        S3Client::new(&aws),
        config.upload_bucket.clone(),
    ));

    tracing::info!(
        "Thesis portal API starting (table: {}, bucket: {})",
        config.table_name,
        config.upload_bucket
    );

    let state = AppState::new(config, store.clone(), store, identity, storage);

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
