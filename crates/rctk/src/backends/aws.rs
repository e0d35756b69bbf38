//! ☁️ The AWS adapters — thin, honest wrappers around the SDK clients.
//!
//! Every adapter does the same three things: build a request, send it, and turn
//! whatever went wrong into a [`RemoteError`] (code + message) so the retry policy
//! can have an opinion about it. No business logic lives down here.
//!
//! 🔑 Credentials come from the SDK's default provider chain. We only pass the
//! profile, region and endpoint along, and we never mutate the loaded config.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_lambda::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use tracing::debug;

use crate::app_config::AwsConfig;
use crate::retry::RemoteError;

pub mod cloudwatch;
pub mod dynamodb;
pub mod events;
pub mod iam;
pub mod lambda;
pub mod rds;

/// 🔌 Load the shared SDK config from an explicit [`AwsConfig`].
pub async fn load_sdk_config(aws: &AwsConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(profile) = &aws.profile {
        debug!("🔑 using aws profile {profile}");
        loader = loader.profile_name(profile);
    }
    if let Some(region) = &aws.region {
        debug!("🌍 using aws region {region}");
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(endpoint) = &aws.endpoint_url {
        debug!("🎯 using endpoint {endpoint}");
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}

/// 🧰 One client per service, all built from the same [`SdkConfig`].
///
/// Clients are cheap handles around a shared connection pool; cloning is fine.
#[derive(Debug, Clone)]
pub struct AwsClients {
    pub dynamodb: aws_sdk_dynamodb::Client,
    pub logs: aws_sdk_cloudwatchlogs::Client,
    pub lambda: aws_sdk_lambda::Client,
    pub iam: aws_sdk_iam::Client,
    pub events: aws_sdk_eventbridge::Client,
    pub rds: aws_sdk_rdsdata::Client,
}

impl AwsClients {
    pub fn new(sdk: &SdkConfig) -> Self {
        Self {
            dynamodb: aws_sdk_dynamodb::Client::new(sdk),
            logs: aws_sdk_cloudwatchlogs::Client::new(sdk),
            lambda: aws_sdk_lambda::Client::new(sdk),
            iam: aws_sdk_iam::Client::new(sdk),
            events: aws_sdk_eventbridge::Client::new(sdk),
            rds: aws_sdk_rdsdata::Client::new(sdk),
        }
    }

    pub async fn connect(aws: &AwsConfig) -> Self {
        Self::new(&load_sdk_config(aws).await)
    }
}

/// 📡 Boil an SDK failure down to code + message.
///
/// Service errors keep the provider's code. Timeouts become `RequestTimeout` and
/// dispatch failures `NetworkingError`, so both classify as transient. Anything
/// else keeps its full rendered chain and no code.
pub fn remote_error<E, R>(err: SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match &err {
        SdkError::ServiceError(service) => {
            let inner = service.err();
            let message = inner
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(inner).to_string());
            RemoteError {
                code: inner.code().map(str::to_string),
                message,
            }
        }
        SdkError::TimeoutError(_) => {
            RemoteError::new("RequestTimeout", DisplayErrorContext(&err).to_string())
        }
        SdkError::DispatchFailure(_) => {
            RemoteError::new("NetworkingError", DisplayErrorContext(&err).to_string())
        }
        _ => RemoteError::uncoded(DisplayErrorContext(&err).to_string()),
    }
}

/// 🕳️ The SDK says a field is optional; we need it. Treat its absence as a remote failure.
pub(crate) fn missing(what: &str) -> RemoteError {
    RemoteError::uncoded(format!("💀 the response did not include {what}"))
}
