use std::path::PathBuf;

use clap::Parser;
use keysync_credentials::{Credentials, Session};
use keysync_iam::Iam;
use keysync_s3::{Address, Bucket};

use crate::{DEFAULT_CONCURRENCY, Reconciler};

/// Settings of one `keysync` invocation, read from flags or the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "keysync")]
#[command(bin_name = "keysync")]
#[command(about = "Publish SSH public keys from IAM as authorized_keys files in S3", long_about = None)]
pub struct Config {
    /// Bucket the key files are written to
    #[arg(long, env = "S3_BUCKET")]
    pub bucket: String,

    /// S3 endpoint; defaults to the AWS endpoint of the region
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Address the bucket as `<endpoint>/<bucket>` instead of `<bucket>.<endpoint>`
    #[arg(long)]
    pub path_style: bool,

    /// Region used to sign S3 requests
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,

    /// IAM endpoint
    #[arg(long, env = "IAM_ENDPOINT", default_value = keysync_iam::DEFAULT_ENDPOINT)]
    pub iam_endpoint: String,

    /// Access key id used to sign requests
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key_id: Option<String>,

    /// Secret access key used to sign requests
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// Session token of temporary credentials
    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    pub session_token: Option<String>,

    /// Principals resolved and uploaded at the same time; 0 removes the limit
    #[arg(long, env = "KEYSYNC_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// PID lock file; when held by a live process the run is skipped
    #[arg(long, env = "KEYSYNC_LOCK_FILE")]
    pub lock_file: Option<PathBuf>,
}

impl Config {
    /// The session both clients sign with. Unsigned when no credentials are set.
    pub fn session(&self) -> Session {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                let credentials = Credentials::new(access_key_id, secret_access_key);
                match &self.session_token {
                    Some(token) => credentials.with_session_token(token).into(),
                    None => credentials.into(),
                }
            }
            _ => {
                tracing::warn!("no AWS credentials configured, sending unsigned requests");
                Session::Public
            }
        }
    }

    /// The S3 endpoint, defaulting to `https://s3.<region>.amazonaws.com`.
    pub fn s3_endpoint(&self) -> String {
        self.s3_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.region))
    }

    /// Open the key store bucket.
    pub fn bucket(&self) -> anyhow::Result<Bucket> {
        let address = Address::new(self.s3_endpoint(), &self.region, &self.bucket);
        let bucket = Bucket::open(address, self.session())?;
        Ok(if self.path_style {
            bucket.with_path_style(true)
        } else {
            bucket
        })
    }

    /// Open the IAM directory.
    pub fn directory(&self) -> anyhow::Result<Iam> {
        Ok(Iam::open(&self.iam_endpoint, self.session())?)
    }

    /// Build the reconciler for these settings.
    pub fn reconciler(&self) -> anyhow::Result<Reconciler<Iam, Bucket>> {
        Ok(Reconciler::new(self.directory()?, self.bucket()?).with_concurrency(self.concurrency))
    }
}
