//! Helpers for exercising the HTTP collaborators against `mockito`.

/// Client that never routes loopback traffic through a proxy.
pub fn local_client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .no_proxy()
        .build()
        .expect("http client")
}
