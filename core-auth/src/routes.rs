//! Backend route construction.

use crate::types::ProviderType;
use url::form_urlencoded::byte_serialize;

const API_PATH: &str = "/api/client/v2.0";

#[derive(Debug, Clone)]
pub(crate) struct Routes {
    base_url: String,
    app_id: String,
}

impl Routes {
    /// `base_url` must already have its trailing slash removed.
    pub fn new(base_url: impl Into<String>, app_id: &str) -> Self {
        Self {
            base_url: base_url.into(),
            app_id: byte_serialize(app_id.as_bytes()).collect(),
        }
    }

    fn api(&self) -> String {
        format!("{}{}", self.base_url, API_PATH)
    }

    fn app(&self) -> String {
        format!("{}/app/{}", self.api(), self.app_id)
    }

    pub fn login(&self, provider: &ProviderType) -> String {
        format!("{}/auth/providers/{}/login", self.app(), provider.as_str())
    }

    pub fn link(&self, provider: &ProviderType) -> String {
        format!("{}?link=true", self.login(provider))
    }

    pub fn profile(&self) -> String {
        format!("{}/auth/profile", self.api())
    }

    pub fn session(&self) -> String {
        format!("{}/auth/session", self.api())
    }

    pub fn function_call(&self) -> String {
        format!("{}/functions/call", self.app())
    }
}
