use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;

/// Builds an S3 client from the default credential chain.
///
/// When `AWS_ENDPOINT_URL` is set (LocalStack, MinIO, other S3-compatible
/// hosts) the client targets it with path-style addressing.
pub async fn new_client(region: &str) -> aws_sdk_s3::Client {
    let shared = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;

    let mut builder = aws_sdk_s3::config::Builder::from(&shared);
    if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
        if !endpoint.trim().is_empty() {
            builder = builder.endpoint_url(endpoint.trim()).force_path_style(true);
        }
    }
    aws_sdk_s3::Client::from_conf(builder.build())
}
