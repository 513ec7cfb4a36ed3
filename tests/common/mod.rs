use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::StatusCode;
use tempfile::TempDir;

use oauth2_fetch::client::OAuth2Client;
use oauth2_fetch::config::ClientSettings;
use oauth2_fetch::transport::fake::FakeTransport;
use oauth2_fetch::transport::HttpResponse;

pub const SERVER: &str = "https://auth.example.com/";

#[allow(dead_code)]
pub fn fake_client(settings: ClientSettings) -> (Arc<OAuth2Client>, Arc<FakeTransport>) {
    let transport = Arc::new(FakeTransport::new());
    let client = Arc::new(OAuth2Client::new(settings, transport.clone()));
    (client, transport)
}

#[allow(dead_code)]
pub fn token_body(access_token: &str, expires_in: Option<i64>) -> HttpResponse {
    let mut body = serde_json::json!({ "access_token": access_token, "token_type": "Bearer" });
    if let Some(secs) = expires_in {
        body["expires_in"] = serde_json::json!(secs);
    }
    HttpResponse::json(StatusCode::OK, &body)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("oauth2.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
