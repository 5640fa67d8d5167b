//! IAM Query API actions.

use keysync_credentials::Invocation;
use url::Url;

use crate::{API_VERSION, SIGNING_REGION};

/// One IAM Query API call: an action name and its parameters.
#[derive(Debug, Clone)]
pub struct Action {
    name: &'static str,
    params: Vec<(&'static str, String)>,
}

impl Action {
    /// Create an action without parameters.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            params: Vec::new(),
        }
    }

    /// Add a parameter.
    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.params.push((key, value.into()));
        self
    }

    /// The action name (e.g. `ListUsers`).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Build the signable request for this action against `endpoint`.
    pub fn request(&self, endpoint: &Url) -> ActionRequest {
        let mut url = endpoint.clone();
        url.set_path("/");
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("Action", self.name);
            query.append_pair("Version", API_VERSION);
            for (key, value) in &self.params {
                query.append_pair(key, value);
            }
        }
        ActionRequest { url }
    }
}

/// A signable `GET` for an [`Action`].
#[derive(Debug, Clone)]
pub struct ActionRequest {
    url: Url,
}

impl Invocation for ActionRequest {
    fn method(&self) -> &'static str {
        "GET"
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn region(&self) -> &str {
        SIGNING_REGION
    }

    fn service(&self) -> &str {
        "iam"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_builds_query_with_action_version_and_params() {
        let endpoint = Url::parse("https://iam.amazonaws.com").unwrap();
        let request = Action::new("GetGroup")
            .with("GroupName", "site admins")
            .request(&endpoint);

        assert_eq!(
            request.url().as_str(),
            "https://iam.amazonaws.com/?Action=GetGroup&Version=2010-05-08&GroupName=site+admins"
        );
        assert_eq!(request.service(), "iam");
        assert_eq!(request.region(), "us-east-1");
    }

    #[test]
    fn it_does_not_mutate_the_action_when_building_requests() {
        let endpoint = Url::parse("http://127.0.0.1:8080").unwrap();
        let action = Action::new("ListUsers");

        let first = action.request(&endpoint);
        let second = action.clone().with("Marker", "m1").request(&endpoint);

        assert!(!first.url().as_str().contains("Marker"));
        assert!(second.url().as_str().contains("Marker=m1"));
    }
}
