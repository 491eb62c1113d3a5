//! HTTP client for the backup admin API

use reqwest::{Client, Response};
use serde_json::{json, Value};

pub struct TestClient {
    pub client: Client,
    pub base_url: String,
}

#[allow(dead_code)]
impl TestClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/admin/backup{}", self.base_url, path)
    }

    pub async fn status(&self) -> Value {
        self.client
            .get(self.url("/status"))
            .send()
            .await
            .expect("Status request failed")
            .json()
            .await
            .expect("Status response is not JSON")
    }

    pub async fn control(&self, action: &str) -> Response {
        self.client
            .post(self.url("/control"))
            .json(&json!({ "action": action }))
            .send()
            .await
            .expect("Control request failed")
    }

    pub async fn probe_transport(&self) -> Response {
        self.client
            .get(self.url("/probe-transport"))
            .send()
            .await
            .expect("Probe request failed")
    }

    pub async fn collection_counts(&self) -> Response {
        self.client
            .get(self.url("/collection-counts"))
            .send()
            .await
            .expect("Collection counts request failed")
    }

    pub async fn home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }
}
