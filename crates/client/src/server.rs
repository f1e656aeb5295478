//! Connection details for one server installation.

use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};

use crate::ClientError;
use crate::types::TargetAuth;

/// URL and credentials of a server, as read from the tool configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDetails {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub access_token: String,
}

impl ServerDetails {
    /// Server URL with a guaranteed trailing slash.
    pub fn base_url(&self) -> Result<String, ClientError> {
        if self.url.is_empty() {
            return Err(ClientError::Config(format!(
                "server '{}' has no url",
                self.id
            )));
        }
        if self.url.ends_with('/') {
            Ok(self.url.clone())
        } else {
            Ok(format!("{}/", self.url))
        }
    }

    /// Adds bearer or basic authentication to a request.
    pub(crate) fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        if !self.access_token.is_empty() {
            req.bearer_auth(&self.access_token)
        } else if !self.user.is_empty() {
            req.basic_auth(&self.user, Some(&self.password))
        } else {
            req
        }
    }

    /// Credentials the source plugin uses to deploy into this server.
    pub fn target_auth(&self) -> TargetAuth {
        let url = self.base_url().unwrap_or_else(|_| self.url.clone());
        if self.access_token.is_empty() {
            TargetAuth {
                target_artifactory_url: url,
                target_username: self.user.clone(),
                target_password: self.password.clone(),
                target_token: String::new(),
            }
        } else {
            TargetAuth {
                target_artifactory_url: url,
                target_token: self.access_token.clone(),
                ..Default::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(url: &str) -> ServerDetails {
        ServerDetails {
            id: "target".into(),
            url: url.into(),
            user: "admin".into(),
            password: "secret".into(),
            access_token: String::new(),
        }
    }

    #[test]
    fn base_url_appends_slash() {
        assert_eq!(
            server("https://rt.example.com/artifactory").base_url().unwrap(),
            "https://rt.example.com/artifactory/"
        );
        assert_eq!(
            server("https://rt.example.com/artifactory/").base_url().unwrap(),
            "https://rt.example.com/artifactory/"
        );
    }

    #[test]
    fn empty_url_rejected() {
        assert!(matches!(server("").base_url(), Err(ClientError::Config(_))));
    }

    #[test]
    fn target_auth_prefers_token() {
        let mut s = server("https://target/");
        let auth = s.target_auth();
        assert_eq!(auth.target_username, "admin");
        assert_eq!(auth.target_password, "secret");
        assert!(auth.target_token.is_empty());

        s.access_token = "tok".into();
        let auth = s.target_auth();
        assert_eq!(auth.target_token, "tok");
        assert!(auth.target_username.is_empty());
        assert!(auth.target_password.is_empty());
    }
}
