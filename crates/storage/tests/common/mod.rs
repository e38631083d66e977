use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use depot_storage::S3Backend;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::{ContainerAsync, GenericImage, ImageExt, runners::AsyncRunner};

const MINIO_IMAGE: &str = "minio/minio";
const MINIO_TAG: &str = "RELEASE.2024-02-12T21-36-45Z";
const ACCESS_KEY: &str = "minio-access-key";
const SECRET_KEY: &str = "minio-secret-key";

#[allow(dead_code)]
pub fn should_skip_s3_tests() -> bool {
    std::env::var("SKIP_S3_TESTS").is_ok()
}

/// A MinIO container with one bucket and a backend pointed at it.
#[allow(dead_code)]
pub struct MinioHarness {
    _container: ContainerAsync<GenericImage>,
    pub endpoint: String,
    pub backend: S3Backend,
}

#[allow(dead_code)]
impl MinioHarness {
    pub async fn start(bucket: &str, prefix: Option<&str>) -> Result<Self, String> {
        let container = GenericImage::new(MINIO_IMAGE, MINIO_TAG)
            .with_exposed_port(9000.tcp())
            .with_wait_for(WaitFor::message_on_stdout("API:"))
            .with_env_var("MINIO_ROOT_USER", ACCESS_KEY)
            .with_env_var("MINIO_ROOT_PASSWORD", SECRET_KEY)
            .with_cmd(vec!["server", "/data"])
            .start()
            .await
            .map_err(|e| format!("failed to start MinIO container: {e}"))?;

        let host = container
            .get_host()
            .await
            .map_err(|e| format!("failed to get host: {e}"))?;
        let port = container
            .get_host_port_ipv4(9000.tcp())
            .await
            .map_err(|e| format!("failed to get port: {e}"))?;
        let endpoint = format!("http://{host}:{port}");

        create_bucket(&endpoint, bucket).await?;

        let backend = S3Backend::new(
            bucket,
            Some(endpoint.clone()),
            Some("us-east-1".to_string()),
            prefix.map(str::to_string),
            Some(ACCESS_KEY.to_string()),
            Some(SECRET_KEY.to_string()),
            true,
        )
        .await
        .map_err(|e| format!("failed to create S3 backend: {e}"))?;

        Ok(Self {
            _container: container,
            endpoint,
            backend,
        })
    }
}

async fn create_bucket(endpoint: &str, bucket: &str) -> Result<(), String> {
    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(aws_config::Region::new("us-east-1"))
        .credentials_provider(Credentials::new(ACCESS_KEY, SECRET_KEY, None, None, "test"))
        .http_client(aws_smithy_http_client::Builder::new().build_http())
        .endpoint_url(endpoint)
        .force_path_style(true)
        .build();

    Client::from_conf(config)
        .create_bucket()
        .bucket(bucket)
        .send()
        .await
        .map_err(|e| format!("failed to create bucket: {e}"))?;
    Ok(())
}
