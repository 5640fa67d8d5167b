//! Testing helpers: an in-memory IAM Query API server.
//!
//! [`LocalIam`] answers the read-only actions used by [`Iam`](crate::Iam)
//! from in-memory users, groups and SSH keys. It paginates with a
//! configurable page size, reports `NoSuchEntity` like IAM does, rejects
//! unsigned requests and counts calls per action so tests can assert on
//! directory traffic.
//!
//! ```no_run
//! use keysync_credentials::Credentials;
//! use keysync_iam::{Iam, KeyStatus, helpers::LocalIam};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let server = LocalIam::start("test-access-key").await?;
//! server.add_user("alice").await;
//! server.add_key("alice", "APKA1", "ssh-ed25519 AAAA", KeyStatus::Active).await;
//!
//! let iam = Iam::open(&server.endpoint, Credentials::new("test-access-key", "secret"))?;
//! assert_eq!(iam.list_users().await?.len(), 1);
//! server.stop();
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use quick_xml::escape::escape;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::KeyStatus;

const NAMESPACE: &str = "https://iam.amazonaws.com/doc/2010-05-08/";

/// Page size used unless [`LocalIam::set_page_size`] is called.
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
struct StoredKey {
    id: String,
    body: String,
    status: KeyStatus,
}

#[derive(Debug)]
struct State {
    access_key_id: String,
    users: BTreeMap<String, Vec<StoredKey>>,
    groups: BTreeMap<String, Vec<String>>,
    calls: HashMap<String, usize>,
    page_size: usize,
}

/// A running IAM test server instance.
pub struct LocalIam {
    /// The endpoint URL where the server is listening
    pub endpoint: String,
    state: Arc<RwLock<State>>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl LocalIam {
    /// Start a server accepting requests signed with `access_key_id`.
    pub async fn start(access_key_id: &str) -> anyhow::Result<Self> {
        let state = Arc::new(RwLock::new(State {
            access_key_id: access_key_id.to_string(),
            users: BTreeMap::new(),
            groups: BTreeMap::new(),
            calls: HashMap::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let endpoint = format!("http://{}", addr);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = listener.accept() => {
                        if let Ok((stream, _)) = result {
                            let state = server_state.clone();
                            tokio::spawn(async move {
                                let service = hyper::service::service_fn(move |req| {
                                    let state = state.clone();
                                    async move { handle_request(req, state).await }
                                });
                                let _ = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), service)
                                    .await;
                            });
                        }
                    }
                }
            }
        });

        Ok(Self {
            endpoint,
            state,
            shutdown_tx,
        })
    }

    /// Add a user without keys.
    pub async fn add_user(&self, user_name: &str) {
        let mut state = self.state.write().await;
        state.users.entry(user_name.to_string()).or_default();
    }

    /// Remove a user and its keys. Group memberships are left in place, so
    /// groups may reference a user that no longer exists.
    pub async fn remove_user(&self, user_name: &str) {
        let mut state = self.state.write().await;
        state.users.remove(user_name);
    }

    /// Upload an SSH key for `user_name`, creating the user if needed.
    pub async fn add_key(&self, user_name: &str, key_id: &str, body: &str, status: KeyStatus) {
        let mut state = self.state.write().await;
        state
            .users
            .entry(user_name.to_string())
            .or_default()
            .push(StoredKey {
                id: key_id.to_string(),
                body: body.to_string(),
                status,
            });
    }

    /// Delete one SSH key.
    pub async fn remove_key(&self, user_name: &str, key_id: &str) {
        let mut state = self.state.write().await;
        if let Some(keys) = state.users.get_mut(user_name) {
            keys.retain(|key| key.id != key_id);
        }
    }

    /// Create (or replace) a group with the given members, in listing order.
    pub async fn add_group(&self, group_name: &str, members: &[&str]) {
        let mut state = self.state.write().await;
        state.groups.insert(
            group_name.to_string(),
            members.iter().map(|member| member.to_string()).collect(),
        );
    }

    /// Delete a group.
    pub async fn remove_group(&self, group_name: &str) {
        let mut state = self.state.write().await;
        state.groups.remove(group_name);
    }

    /// Limit the number of elements returned per page.
    pub async fn set_page_size(&self, page_size: usize) {
        let mut state = self.state.write().await;
        state.page_size = page_size.max(1);
    }

    /// Number of authorized requests received for `action`.
    pub async fn calls(&self, action: &str) -> usize {
        let state = self.state.read().await;
        state.calls.get(action).copied().unwrap_or_default()
    }

    /// Stop the server.
    pub fn stop(self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn respond(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/xml"));
    response
}

fn error(status: StatusCode, code: &str, message: &str) -> Response<Full<Bytes>> {
    respond(
        status,
        format!(
            "<ErrorResponse xmlns=\"{}\"><Error><Type>Sender</Type><Code>{}</Code><Message>{}</Message></Error><RequestId>local</RequestId></ErrorResponse>",
            NAMESPACE,
            escape(code),
            escape(message)
        ),
    )
}

fn document(action: &str, result: String) -> Response<Full<Bytes>> {
    respond(
        StatusCode::OK,
        format!(
            "<{action}Response xmlns=\"{NAMESPACE}\"><{action}Result>{result}</{action}Result><ResponseMetadata><RequestId>local</RequestId></ResponseMetadata></{action}Response>"
        ),
    )
}

/// Render one page of `items` starting after `marker` as `<member>` elements.
fn page<T>(
    container: &str,
    items: &[T],
    marker: Option<&str>,
    page_size: usize,
    render: impl Fn(&T) -> String,
) -> Result<String, Response<Full<Bytes>>> {
    let start = match marker {
        Some(marker) => marker.parse::<usize>().map_err(|_| {
            error(StatusCode::BAD_REQUEST, "ValidationError", "Invalid marker")
        })?,
        None => 0,
    };
    let end = (start + page_size).min(items.len());
    let members: String = items
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .map(|item| format!("<member>{}</member>", render(item)))
        .collect();

    let truncated = end < items.len();
    let marker = if truncated {
        format!("<Marker>{}</Marker>", end)
    } else {
        String::new()
    };

    Ok(format!(
        "<{container}>{members}</{container}><IsTruncated>{truncated}</IsTruncated>{marker}"
    ))
}

fn status_name(status: KeyStatus) -> &'static str {
    match status {
        KeyStatus::Active => "Active",
        KeyStatus::Inactive => "Inactive",
        KeyStatus::Other => "Unknown",
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<RwLock<State>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let params: HashMap<String, String> = url::form_urlencoded::parse(
        req.uri().query().unwrap_or_default().as_bytes(),
    )
    .into_owned()
    .collect();
    let param = |name: &str| params.get(name).map(String::as_str);

    let mut state = state.write().await;

    let signed = param("X-Amz-Signature").is_some_and(|signature| !signature.is_empty());
    let credential_prefix = format!("{}/", state.access_key_id);
    let known = param("X-Amz-Credential")
        .is_some_and(|credential| credential.starts_with(&credential_prefix));
    if !signed {
        return Ok(error(
            StatusCode::FORBIDDEN,
            "MissingAuthenticationToken",
            "Request is missing Authentication Token",
        ));
    }
    if !known {
        return Ok(error(
            StatusCode::FORBIDDEN,
            "InvalidClientTokenId",
            "The security token included in the request is invalid.",
        ));
    }

    let action = param("Action").unwrap_or_default().to_string();
    *state.calls.entry(action.clone()).or_default() += 1;

    let page_size = state.page_size;
    let marker = param("Marker");

    let result = match action.as_str() {
        "ListUsers" => {
            let users: Vec<&String> = state.users.keys().collect();
            page("Users", users.as_slice(), marker, page_size, |name| {
                format!("<UserName>{}</UserName>", escape(name.as_str()))
            })
        }
        "ListGroups" => {
            let groups: Vec<&String> = state.groups.keys().collect();
            page("Groups", groups.as_slice(), marker, page_size, |name| {
                format!("<GroupName>{}</GroupName>", escape(name.as_str()))
            })
        }
        "GetGroup" => {
            let group_name = param("GroupName").unwrap_or_default();
            match state.groups.get(group_name) {
                Some(members) => page("Users", members.as_slice(), marker, page_size, |name| {
                    format!("<UserName>{}</UserName>", escape(name.as_str()))
                })
                .map(|users| {
                    format!(
                        "<Group><GroupName>{}</GroupName></Group>{}",
                        escape(group_name),
                        users
                    )
                }),
                None => Err(error(
                    StatusCode::NOT_FOUND,
                    "NoSuchEntity",
                    &format!("The group with name {} cannot be found.", group_name),
                )),
            }
        }
        "ListSSHPublicKeys" => {
            let user_name = param("UserName").unwrap_or_default();
            match state.users.get(user_name) {
                Some(keys) => page("SSHPublicKeys", keys.as_slice(), marker, page_size, |key| {
                    format!(
                        "<UserName>{}</UserName><SSHPublicKeyId>{}</SSHPublicKeyId><Status>{}</Status>",
                        escape(user_name),
                        escape(key.id.as_str()),
                        status_name(key.status)
                    )
                }),
                None => Err(error(
                    StatusCode::NOT_FOUND,
                    "NoSuchEntity",
                    &format!("The user with name {} cannot be found.", user_name),
                )),
            }
        }
        "GetSSHPublicKey" => {
            let user_name = param("UserName").unwrap_or_default();
            let key_id = param("SSHPublicKeyId").unwrap_or_default();
            let key = state
                .users
                .get(user_name)
                .and_then(|keys| keys.iter().find(|key| key.id == key_id));

            match (param("Encoding"), key) {
                (Some("SSH"), Some(key)) => Ok(format!(
                    "<SSHPublicKey><UserName>{}</UserName><SSHPublicKeyId>{}</SSHPublicKeyId><SSHPublicKeyBody>{}</SSHPublicKeyBody><Status>{}</Status></SSHPublicKey>",
                    escape(user_name),
                    escape(key.id.as_str()),
                    escape(key.body.as_str()),
                    status_name(key.status)
                )),
                (Some("SSH"), None) => Err(error(
                    StatusCode::NOT_FOUND,
                    "NoSuchEntity",
                    &format!("The Public Key with id {} cannot be found.", key_id),
                )),
                _ => Err(error(
                    StatusCode::BAD_REQUEST,
                    "ValidationError",
                    "Only the SSH encoding is supported",
                )),
            }
        }
        _ => Err(error(
            StatusCode::BAD_REQUEST,
            "InvalidAction",
            &format!("Could not find operation {}", action),
        )),
    };

    Ok(match result {
        Ok(result) => document(&action, result),
        Err(response) => response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_renders_truncated_pages_with_marker() {
        let items = vec!["a", "b", "c"];

        let first = page("Users", items.as_slice(), None, 2, |item| item.to_string()).unwrap();
        assert_eq!(
            first,
            "<Users><member>a</member><member>b</member></Users><IsTruncated>true</IsTruncated><Marker>2</Marker>"
        );

        let last = page("Users", items.as_slice(), Some("2"), 2, |item| item.to_string()).unwrap();
        assert_eq!(
            last,
            "<Users><member>c</member></Users><IsTruncated>false</IsTruncated>"
        );
    }

    #[test]
    fn it_renders_empty_pages() {
        let items: Vec<&str> = Vec::new();
        let rendered = page("Users", items.as_slice(), None, 10, |item| item.to_string()).unwrap();
        assert_eq!(rendered, "<Users></Users><IsTruncated>false</IsTruncated>");
    }
}
