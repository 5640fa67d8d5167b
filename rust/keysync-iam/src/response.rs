//! IAM Query API response documents.
//!
//! IAM wraps every result in `<{Action}Response><{Action}Result>...`, and
//! lists in `<member>` elements. Only the fields the directory needs are
//! modeled; everything else in the document is ignored.

use serde::Deserialize;

use crate::IamError;

/// A list of `<member>` elements.
#[derive(Debug, Deserialize)]
pub struct Members<T> {
    #[serde(rename = "member", default = "Vec::new")]
    member: Vec<T>,
}

impl<T> Default for Members<T> {
    fn default() -> Self {
        Self { member: Vec::new() }
    }
}

impl<T> Members<T> {
    fn into_vec(self) -> Vec<T> {
        self.member
    }
}

/// An IAM user.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// The friendly name of the user
    #[serde(rename = "UserName")]
    pub user_name: String,
}

/// An IAM group.
#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    /// The friendly name of the group
    #[serde(rename = "GroupName")]
    pub group_name: String,
}

/// Status of an SSH public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum KeyStatus {
    /// The key can be used for authentication
    Active,
    /// The key has been disabled
    Inactive,
    /// Any status this client does not know about
    #[serde(other)]
    Other,
}

/// SSH public key metadata as returned by `ListSSHPublicKeys`.
#[derive(Debug, Clone, Deserialize)]
pub struct SshPublicKeyMetadata {
    /// The owning user
    #[serde(rename = "UserName")]
    pub user_name: String,
    /// The key identifier
    #[serde(rename = "SSHPublicKeyId")]
    pub ssh_public_key_id: String,
    /// Whether the key is active
    #[serde(rename = "Status")]
    pub status: KeyStatus,
}

/// An SSH public key with its material, as returned by `GetSSHPublicKey`.
#[derive(Debug, Clone, Deserialize)]
pub struct SshPublicKey {
    /// The owning user
    #[serde(rename = "UserName")]
    pub user_name: String,
    /// The key identifier
    #[serde(rename = "SSHPublicKeyId")]
    pub ssh_public_key_id: String,
    /// The key in the requested encoding (`ssh-rsa AAAA...` for `SSH`)
    #[serde(rename = "SSHPublicKeyBody")]
    pub ssh_public_key_body: String,
    /// Whether the key is active
    #[serde(rename = "Status")]
    pub status: KeyStatus,
}

/// One page of a paginated IAM list action.
pub trait Page: serde::de::DeserializeOwned {
    /// The listed element type
    type Item;

    /// Split the page into its items and the marker of the next page, if the
    /// listing is truncated. A truncated page without a marker is an error.
    fn into_parts(self) -> Result<(Vec<Self::Item>, Option<String>), IamError>;
}

fn next_marker(is_truncated: bool, marker: Option<String>) -> Result<Option<String>, IamError> {
    if !is_truncated {
        return Ok(None);
    }
    match marker.filter(|marker| !marker.is_empty()) {
        Some(marker) => Ok(Some(marker)),
        None => Err(IamError::Serialization(
            "Truncated listing without a marker".into(),
        )),
    }
}

/// `ListUsers` response document
#[derive(Debug, Deserialize)]
pub struct ListUsersResponse {
    #[serde(rename = "ListUsersResult")]
    result: ListUsersResult,
}

#[derive(Debug, Deserialize)]
struct ListUsersResult {
    #[serde(rename = "Users", default)]
    users: Members<User>,
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "Marker")]
    marker: Option<String>,
}

impl Page for ListUsersResponse {
    type Item = User;

    fn into_parts(self) -> Result<(Vec<User>, Option<String>), IamError> {
        let result = self.result;
        let marker = next_marker(result.is_truncated, result.marker)?;
        Ok((result.users.into_vec(), marker))
    }
}

/// `ListGroups` response document
#[derive(Debug, Deserialize)]
pub struct ListGroupsResponse {
    #[serde(rename = "ListGroupsResult")]
    result: ListGroupsResult,
}

#[derive(Debug, Deserialize)]
struct ListGroupsResult {
    #[serde(rename = "Groups", default)]
    groups: Members<Group>,
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "Marker")]
    marker: Option<String>,
}

impl Page for ListGroupsResponse {
    type Item = Group;

    fn into_parts(self) -> Result<(Vec<Group>, Option<String>), IamError> {
        let result = self.result;
        let marker = next_marker(result.is_truncated, result.marker)?;
        Ok((result.groups.into_vec(), marker))
    }
}

/// `GetGroup` response document
#[derive(Debug, Deserialize)]
pub struct GetGroupResponse {
    #[serde(rename = "GetGroupResult")]
    result: GetGroupResult,
}

#[derive(Debug, Deserialize)]
struct GetGroupResult {
    #[serde(rename = "Users", default)]
    users: Members<User>,
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "Marker")]
    marker: Option<String>,
}

impl Page for GetGroupResponse {
    type Item = User;

    fn into_parts(self) -> Result<(Vec<User>, Option<String>), IamError> {
        let result = self.result;
        let marker = next_marker(result.is_truncated, result.marker)?;
        Ok((result.users.into_vec(), marker))
    }
}

/// `ListSSHPublicKeys` response document
#[derive(Debug, Deserialize)]
pub struct ListSshPublicKeysResponse {
    #[serde(rename = "ListSSHPublicKeysResult")]
    result: ListSshPublicKeysResult,
}

#[derive(Debug, Deserialize)]
struct ListSshPublicKeysResult {
    #[serde(rename = "SSHPublicKeys", default)]
    keys: Members<SshPublicKeyMetadata>,
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "Marker")]
    marker: Option<String>,
}

impl Page for ListSshPublicKeysResponse {
    type Item = SshPublicKeyMetadata;

    fn into_parts(self) -> Result<(Vec<SshPublicKeyMetadata>, Option<String>), IamError> {
        let result = self.result;
        let marker = next_marker(result.is_truncated, result.marker)?;
        Ok((result.keys.into_vec(), marker))
    }
}

/// `GetSSHPublicKey` response document
#[derive(Debug, Deserialize)]
pub struct GetSshPublicKeyResponse {
    #[serde(rename = "GetSSHPublicKeyResult")]
    pub(crate) result: GetSshPublicKeyResult,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetSshPublicKeyResult {
    #[serde(rename = "SSHPublicKey")]
    pub(crate) ssh_public_key: SshPublicKey,
}

/// IAM error document: `<ErrorResponse><Error><Code>...`
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(rename = "Error")]
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

impl ErrorResponse {
    /// Turn an error body into an [`IamError`], falling back to the status.
    pub(crate) fn into_error(body: &str, fallback: impl std::fmt::Display) -> IamError {
        match quick_xml::de::from_str::<ErrorResponse>(body) {
            Ok(response) if response.error.code == "NoSuchEntity" => {
                IamError::NotFound(response.error.message.unwrap_or_default())
            }
            Ok(response) => IamError::Service {
                code: response.error.code,
                message: response.error.message.unwrap_or_default(),
            },
            Err(_) => IamError::Service {
                code: "Unknown".into(),
                message: fallback.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_list_users_page() {
        let xml = r#"<ListUsersResponse xmlns="https://iam.amazonaws.com/doc/2010-05-08/">
            <ListUsersResult>
                <IsTruncated>true</IsTruncated>
                <Marker>page-2</Marker>
                <Users>
                    <member>
                        <UserId>AIDA1</UserId>
                        <Path>/</Path>
                        <UserName>alice</UserName>
                        <Arn>arn:aws:iam::123456789012:user/alice</Arn>
                        <CreateDate>2024-01-01T00:00:00Z</CreateDate>
                    </member>
                    <member>
                        <UserName>bob</UserName>
                    </member>
                </Users>
            </ListUsersResult>
            <ResponseMetadata><RequestId>1</RequestId></ResponseMetadata>
        </ListUsersResponse>"#;

        let page: ListUsersResponse = quick_xml::de::from_str(xml).unwrap();
        let (users, marker) = page.into_parts().unwrap();

        let names: Vec<_> = users.into_iter().map(|user| user.user_name).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert_eq!(marker.as_deref(), Some("page-2"));
    }

    #[test]
    fn it_parses_empty_group_membership() {
        let xml = r#"<GetGroupResponse>
            <GetGroupResult>
                <Group><GroupName>ops</GroupName></Group>
                <Users/>
                <IsTruncated>false</IsTruncated>
            </GetGroupResult>
        </GetGroupResponse>"#;

        let page: GetGroupResponse = quick_xml::de::from_str(xml).unwrap();
        let (users, marker) = page.into_parts().unwrap();

        assert!(users.is_empty());
        assert!(marker.is_none());
    }

    #[test]
    fn it_ignores_marker_when_not_truncated() {
        let xml = r#"<ListGroupsResponse>
            <ListGroupsResult>
                <Groups><member><GroupName>ops</GroupName></member></Groups>
                <IsTruncated>false</IsTruncated>
                <Marker>stale</Marker>
            </ListGroupsResult>
        </ListGroupsResponse>"#;

        let page: ListGroupsResponse = quick_xml::de::from_str(xml).unwrap();
        let (groups, marker) = page.into_parts().unwrap();

        assert_eq!(groups[0].group_name, "ops");
        assert!(marker.is_none());
    }

    #[test]
    fn it_rejects_truncated_pages_without_a_marker() {
        let xml = r#"<ListUsersResponse>
            <ListUsersResult>
                <Users><member><UserName>alice</UserName></member></Users>
                <IsTruncated>true</IsTruncated>
            </ListUsersResult>
        </ListUsersResponse>"#;

        let page: ListUsersResponse = quick_xml::de::from_str(xml).unwrap();
        let error = page.into_parts().unwrap_err();

        assert!(matches!(error, IamError::Serialization(_)));
    }

    #[test]
    fn it_parses_key_status() {
        let xml = r#"<ListSSHPublicKeysResponse>
            <ListSSHPublicKeysResult>
                <SSHPublicKeys>
                    <member>
                        <UserName>alice</UserName>
                        <SSHPublicKeyId>APKA1</SSHPublicKeyId>
                        <Status>Active</Status>
                        <UploadDate>2024-01-01T00:00:00Z</UploadDate>
                    </member>
                    <member>
                        <UserName>alice</UserName>
                        <SSHPublicKeyId>APKA2</SSHPublicKeyId>
                        <Status>Inactive</Status>
                    </member>
                    <member>
                        <UserName>alice</UserName>
                        <SSHPublicKeyId>APKA3</SSHPublicKeyId>
                        <Status>Expired</Status>
                    </member>
                </SSHPublicKeys>
                <IsTruncated>false</IsTruncated>
            </ListSSHPublicKeysResult>
        </ListSSHPublicKeysResponse>"#;

        let page: ListSshPublicKeysResponse = quick_xml::de::from_str(xml).unwrap();
        let (keys, _) = page.into_parts().unwrap();

        let statuses: Vec<_> = keys.iter().map(|key| key.status).collect();
        assert_eq!(
            statuses,
            vec![KeyStatus::Active, KeyStatus::Inactive, KeyStatus::Other]
        );
    }

    #[test]
    fn it_parses_key_material() {
        let xml = r#"<GetSSHPublicKeyResponse>
            <GetSSHPublicKeyResult>
                <SSHPublicKey>
                    <UserName>alice</UserName>
                    <SSHPublicKeyId>APKA1</SSHPublicKeyId>
                    <Fingerprint>aa:bb</Fingerprint>
                    <SSHPublicKeyBody>ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIE alice@laptop</SSHPublicKeyBody>
                    <Status>Active</Status>
                </SSHPublicKey>
            </GetSSHPublicKeyResult>
        </GetSSHPublicKeyResponse>"#;

        let response: GetSshPublicKeyResponse = quick_xml::de::from_str(xml).unwrap();
        let key = response.result.ssh_public_key;

        assert_eq!(key.ssh_public_key_id, "APKA1");
        assert_eq!(
            key.ssh_public_key_body,
            "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIE alice@laptop"
        );
    }

    #[test]
    fn it_maps_no_such_entity_to_not_found() {
        let xml = r#"<ErrorResponse xmlns="https://iam.amazonaws.com/doc/2010-05-08/">
            <Error>
                <Type>Sender</Type>
                <Code>NoSuchEntity</Code>
                <Message>The group with name ops cannot be found.</Message>
            </Error>
            <RequestId>1</RequestId>
        </ErrorResponse>"#;

        let error = ErrorResponse::into_error(xml, "404 Not Found");
        assert!(
            matches!(error, IamError::NotFound(ref message) if message.contains("ops")),
            "unexpected error: {:?}",
            error
        );
    }

    #[test]
    fn it_maps_other_codes_to_service_errors() {
        let xml = r#"<ErrorResponse>
            <Error>
                <Code>AccessDenied</Code>
                <Message>nope</Message>
            </Error>
        </ErrorResponse>"#;

        let error = ErrorResponse::into_error(xml, "403 Forbidden");
        assert!(matches!(error, IamError::Service { ref code, .. } if code == "AccessDenied"));

        let error = ErrorResponse::into_error("<html>bad gateway</html>", "502 Bad Gateway");
        assert!(
            matches!(error, IamError::Service { ref message, .. } if message == "502 Bad Gateway")
        );
    }
}
