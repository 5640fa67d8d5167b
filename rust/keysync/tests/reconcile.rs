//! End-to-end passes of [`Reconciler`] over the in-memory IAM and S3 servers.
//!
//! Run with:
//! ```bash
//! cargo test -p keysync --test reconcile
//! ```

use anyhow::Result;
use keysync::{Outcome, Principal, Reconciler, SyncError};
use keysync_credentials::Credentials;
use keysync_iam::helpers::LocalIam;
use keysync_iam::{Iam, KeyStatus};
use keysync_s3::helpers::{LocalS3, S3Address, S3Settings, start};

const BUCKET: &str = "test-bucket";

struct Fixture {
    iam: LocalIam,
    s3: LocalS3,
    address: S3Address,
}

impl Fixture {
    async fn start() -> Result<Self> {
        let (address, s3) = start(S3Settings::default()).await?;
        let iam = LocalIam::start(&address.access_key_id).await?;
        Ok(Self { iam, s3, address })
    }

    fn reconciler(&self) -> Result<Reconciler<Iam, keysync_s3::Bucket>> {
        let credentials = Credentials::new(
            &self.address.access_key_id,
            &self.address.secret_access_key,
        );
        let directory = Iam::open(&self.iam.endpoint, credentials)?;
        Ok(Reconciler::new(directory, self.address.open()?))
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        let body = self.address.open()?.get(key).await?;
        Ok(body.map(|body| String::from_utf8_lossy(&body).into_owned()))
    }

    fn stop(self) {
        self.iam.stop();
        self.s3.stop();
    }
}

#[tokio::test]
async fn it_replaces_departed_users_with_new_ones() -> Result<()> {
    let fixture = Fixture::start().await?;
    fixture.s3.insert(BUCKET, "users/alice/authorized_keys", "stale\n").await;
    fixture.s3.insert(BUCKET, "users/bob/authorized_keys", "stale\n").await;

    fixture
        .iam
        .add_key("alice", "APKA1", "ssh-ed25519 AAAAalice", KeyStatus::Active)
        .await;
    fixture
        .iam
        .add_key("carol", "APKA2", "ssh-rsa AAAAcarol", KeyStatus::Active)
        .await;

    let report = fixture.reconciler()?.sync().await?;

    assert_eq!(report.deleted, vec![Principal::user("bob")?]);
    assert_eq!(
        report.written,
        vec![Principal::user("alice")?, Principal::user("carol")?]
    );
    assert_eq!(
        fixture.s3.keys(BUCKET).await,
        vec!["users/alice/authorized_keys", "users/carol/authorized_keys"]
    );
    assert_eq!(
        fixture.read("users/alice/authorized_keys").await?.as_deref(),
        Some("environment=\"SSH_KEY_OWNER=alice\" ssh-ed25519 AAAAalice alice\n")
    );
    assert_eq!(
        fixture.read("users/carol/authorized_keys").await?.as_deref(),
        Some("environment=\"SSH_KEY_OWNER=carol\" ssh-rsa AAAAcarol carol\n")
    );

    fixture.stop();
    Ok(())
}

#[tokio::test]
async fn it_publishes_group_files_and_fetches_shared_users_once() -> Result<()> {
    let fixture = Fixture::start().await?;
    fixture
        .iam
        .add_key("alice", "APKA1", "ssh-ed25519 AAAA1", KeyStatus::Active)
        .await;
    fixture
        .iam
        .add_key("alice", "APKA2", "ssh-ed25519 AAAA2", KeyStatus::Inactive)
        .await;
    fixture
        .iam
        .add_key("bob", "APKA3", "ssh-rsa BBBB", KeyStatus::Active)
        .await;
    fixture.iam.add_group("ops", &["bob", "alice"]).await;
    fixture.iam.add_group("admins", &["alice"]).await;
    fixture.iam.add_group("interns", &[]).await;

    let outcome = fixture.reconciler()?.run().await;
    assert_eq!(outcome, Outcome::success("done!"));

    assert_eq!(
        fixture.read("groups/ops/authorized_keys").await?.as_deref(),
        Some(
            "environment=\"SSH_KEY_OWNER=bob\" ssh-rsa BBBB bob\n\
             environment=\"SSH_KEY_OWNER=alice\" ssh-ed25519 AAAA1 alice\n"
        )
    );
    assert_eq!(
        fixture.read("groups/interns/authorized_keys").await?.as_deref(),
        Some("\n")
    );

    // alice is reached directly, through ops and through admins
    assert_eq!(fixture.iam.calls("ListSSHPublicKeys").await, 2);
    assert_eq!(fixture.iam.calls("GetSSHPublicKey").await, 2);

    fixture.stop();
    Ok(())
}

#[tokio::test]
async fn it_leaves_the_store_unchanged_on_a_second_pass() -> Result<()> {
    let fixture = Fixture::start().await?;
    fixture
        .iam
        .add_key("jane+doe@example.com", "APKA1", "ssh-ed25519 AAAAjane", KeyStatus::Active)
        .await;
    fixture.iam.add_group("ops", &["jane+doe@example.com"]).await;

    let reconciler = fixture.reconciler()?;
    reconciler.sync().await?;
    let keys = fixture.s3.keys(BUCKET).await;
    let content = fixture
        .read("users/jane+doe@example.com/authorized_keys")
        .await?;

    let report = reconciler.sync().await?;

    assert!(report.deleted.is_empty());
    assert_eq!(fixture.s3.keys(BUCKET).await, keys);
    assert_eq!(
        fixture
            .read("users/jane+doe@example.com/authorized_keys")
            .await?,
        content
    );

    fixture.stop();
    Ok(())
}

#[tokio::test]
async fn it_fails_the_run_on_an_unrecognized_store_entry() -> Result<()> {
    let fixture = Fixture::start().await?;
    fixture.s3.insert(BUCKET, "users//authorized_keys", "stale\n").await;
    fixture.s3.insert(BUCKET, "users/bob/authorized_keys", "stale\n").await;
    fixture
        .iam
        .add_key("alice", "APKA1", "ssh-ed25519 AAAAalice", KeyStatus::Active)
        .await;

    let result = fixture.reconciler()?.sync().await;

    assert!(
        matches!(result, Err(SyncError::InvalidPrincipalName(ref name)) if name.is_empty()),
        "unexpected result: {:?}",
        result
    );
    assert_eq!(
        fixture.s3.keys(BUCKET).await,
        vec!["users//authorized_keys", "users/bob/authorized_keys"]
    );

    fixture.stop();
    Ok(())
}

#[tokio::test]
async fn it_fails_the_run_when_the_directory_rejects_credentials() -> Result<()> {
    let fixture = Fixture::start().await?;
    let directory = Iam::open(&fixture.iam.endpoint, Credentials::new("intruder", "secret"))?;
    let reconciler = Reconciler::new(directory, fixture.address.open()?);

    let outcome = reconciler.run().await;

    assert!(!outcome.succeeded);
    assert!(
        outcome.detail.contains("InvalidClientTokenId"),
        "unexpected detail: {}",
        outcome.detail
    );

    fixture.stop();
    Ok(())
}
