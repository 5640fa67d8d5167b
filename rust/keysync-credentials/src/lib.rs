#![warn(missing_docs)]

//! AWS credentials and presigned request signing.
//!
//! Both the S3 object store client and the IAM directory client authorize
//! their requests the same way: every request is described by an
//! [`Invocation`] and turned into a presigned URL (plus the headers that must
//! accompany it) by a [`Session`].
//!
//! ```
//! use keysync_credentials::{Credentials, Invocation, Session};
//! use url::Url;
//!
//! struct ListUsers(Url);
//!
//! impl Invocation for ListUsers {
//!     fn method(&self) -> &'static str {
//!         "GET"
//!     }
//!
//!     fn url(&self) -> &Url {
//!         &self.0
//!     }
//!
//!     fn region(&self) -> &str {
//!         "us-east-1"
//!     }
//!
//!     fn service(&self) -> &str {
//!         "iam"
//!     }
//! }
//!
//! let session = Session::Signed(Credentials::new("AKIDEXAMPLE", "secret"));
//! let url = Url::parse("https://iam.amazonaws.com/?Action=ListUsers&Version=2010-05-08").unwrap();
//! let authorization = session.authorize(&ListUsers(url)).unwrap();
//!
//! assert!(authorization.url.as_str().contains("X-Amz-Signature="));
//! ```

mod access;
pub use access::*;

mod checksum;
pub use checksum::*;
