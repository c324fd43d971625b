use std::{env, path::PathBuf, time::Duration};

use dirs;

/// Environment variable holding the role to assume
pub const ENV_ROLE_ARN: &str = "AWS_ROLE_ARN";

/// Environment variable holding the STS role session name
pub const ENV_ROLE_SESSION_NAME: &str = "AWS_ROLE_SESSION_NAME";

/// Environment variable holding the AWS region used for STS
pub const ENV_AWS_REGION: &str = "AWS_REGION";

/// Environment variable overriding the GCE metadata server host
pub const ENV_METADATA_HOST: &str = "GCE_METADATA_HOST";

/// Default audience requested for the Google ID token
pub const DEFAULT_AUDIENCE: &str = "https://sts.amazonaws.com";

/// Default AWS region for STS operations when no region is configured
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Prefix of generated role session names
pub const SESSION_NAME_PREFIX: &str = "exchange-";

/// Provider name reported to the AWS SDK
pub const PROVIDER_NAME: &str = "GCPProvider";

/// Sessions expiring within this window are exchanged again
pub const SESSION_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// ID tokens expiring within this window are re-issued
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Timeout of the default HTTP client used by the token sources
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default GCE metadata server
pub const DEFAULT_METADATA_BASE_URL: &str = "http://metadata.google.internal";

/// Default IAM Credentials API endpoint
pub const DEFAULT_IAM_CREDENTIALS_BASE_URL: &str = "https://iamcredentials.googleapis.com";

/// OAuth scope requested for the source credential of an impersonation chain
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Grant type used when trading a signed assertion at the Google token endpoint
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of the self-signed assertion sent to the Google token endpoint
pub const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// Default STS session duration used by the CLI
pub const DEFAULT_SESSION_DURATION_SECS: i32 = 3600;

/// AWS configuration directory name
pub const AWS_CONFIG_DIR_NAME: &str = ".aws";

/// AWS shared credentials file name
pub const AWS_CREDENTIALS_FILE_NAME: &str = "credentials";

/// Read an environment variable, treating an empty value as unset
pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Get the AWS credentials file path
/// Respects AWS_SHARED_CREDENTIALS_FILE environment variable if set
pub fn get_aws_credentials_path() -> Option<PathBuf> {
    if let Some(path) = non_empty_env("AWS_SHARED_CREDENTIALS_FILE") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|home| {
        home.join(AWS_CONFIG_DIR_NAME)
            .join(AWS_CREDENTIALS_FILE_NAME)
    })
}
