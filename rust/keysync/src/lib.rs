#![warn(missing_docs)]

//! Synchronize SSH public keys from an identity directory into
//! `authorized_keys` files in an object store.
//!
//! Every user and group of the [`Directory`] gets one key file in the
//! [`KeyStore`], at `users/<name>/authorized_keys` or
//! `groups/<name>/authorized_keys`. Hosts fetch those files instead of
//! querying the directory. A [`Reconciler`] pass deletes the files of
//! principals that left the directory and rewrites everyone else's, so each
//! pass converges the store onto the directory as it was when the pass began.
//!
//! The production pairing is [`keysync_iam::Iam`] with [`keysync_s3::Bucket`]:
//!
//! ```no_run
//! use keysync::Reconciler;
//! use keysync_credentials::Credentials;
//! use keysync_iam::Iam;
//! use keysync_s3::{Address, Bucket};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let credentials = Credentials::from_env()?;
//! let directory = Iam::aws(credentials.clone())?;
//! let store = Bucket::open(Address::aws("us-east-1", "ssh-keys"), credentials)?;
//!
//! let outcome = Reconciler::new(directory, store).run().await;
//! println!("{}", outcome.detail);
//! # Ok(())
//! # }
//! ```

mod config;
pub use config::*;

mod directory;
pub use directory::*;

mod error;
pub use error::*;

mod lock;
pub use lock::*;

mod principal;
pub use principal::*;

mod reconciler;
pub use reconciler::*;

mod resolver;
pub use resolver::*;

mod store;
pub use store::*;

#[cfg(any(test, feature = "helpers"))]
pub mod helpers;
