//! Shared AWS client plumbing for the S3 backend and the CloudFront invalidator.

use crate::error::StorageError;
use aws_credential_types::Credentials;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::future::ProvideCredentials as ProvideCredentialsFuture;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_config::default_provider::credentials::DefaultCredentialsChain;
use tokio::sync::OnceCell;

pub(crate) const DEFAULT_REGION: &str = "us-east-1";

const CREDENTIALS_INIT_ERROR_MARKER: &str = "depot-aws-lazy-credentials-init";
const CREDENTIALS_RESOLVE_ERROR_MARKER: &str = "depot-aws-lazy-credentials-resolve";

/// Builds the AWS default credentials chain on the first signed request
/// rather than at client construction.
#[derive(Debug)]
struct LazyDefaultCredentialsProvider {
    region: String,
    chain: OnceCell<DefaultCredentialsChain>,
}

impl LazyDefaultCredentialsProvider {
    fn new(region: String) -> Self {
        Self {
            region,
            chain: OnceCell::new(),
        }
    }

    async fn chain(&self) -> Result<&DefaultCredentialsChain, CredentialsError> {
        self.chain
            .get_or_try_init(|| async {
                let region = aws_config::Region::new(self.region.clone());
                tokio::task::spawn(async move {
                    DefaultCredentialsChain::builder().region(region).build().await
                })
                .await
                .map_err(|join_err| {
                    CredentialsError::provider_error(format!(
                        "{CREDENTIALS_INIT_ERROR_MARKER}: failed to initialize AWS default credential chain: {join_err}"
                    ))
                })
            })
            .await
    }

    async fn credentials(&self) -> aws_credential_types::provider::Result {
        let chain = self.chain().await?;
        chain.provide_credentials().await.map_err(|err| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_RESOLVE_ERROR_MARKER}: default AWS credentials resolution failed: {err}"
            ))
        })
    }
}

impl ProvideCredentials for LazyDefaultCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFuture<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFuture::new(self.credentials())
    }
}

/// Static credentials when both halves are configured, otherwise the lazily
/// built ambient chain.
pub(crate) fn credentials_provider(
    region: &str,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    provider_name: &'static str,
) -> Result<SharedCredentialsProvider, StorageError> {
    match (access_key_id, secret_access_key) {
        (Some(key_id), Some(secret)) => Ok(SharedCredentialsProvider::new(Credentials::new(
            key_id,
            secret,
            None,
            None,
            provider_name,
        ))),
        (None, None) => Ok(SharedCredentialsProvider::new(
            LazyDefaultCredentialsProvider::new(region.to_string()),
        )),
        _ => Err(StorageError::Config(
            "access_key_id and secret_access_key must be set together".to_string(),
        )),
    }
}

/// Map an SDK failure, surfacing credential-chain problems as configuration errors.
pub(crate) fn map_operation_error<E>(err: E) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let text = err.to_string();
    if text.contains(CREDENTIALS_INIT_ERROR_MARKER) || text.contains(CREDENTIALS_RESOLVE_ERROR_MARKER)
    {
        return StorageError::Config(
            "AWS credential initialization failed. Configure credentials explicitly or make ambient AWS credentials available."
                .to_string(),
        );
    }
    StorageError::S3(Box::new(err))
}
