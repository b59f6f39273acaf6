use std::time::Duration;

use reqwest::{
    blocking::{
        Client,
        Response,
    },
    Proxy,
};

use crate::core::AnkiportError;

pub fn http_client(timeout: Duration) -> Result<Client, AnkiportError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AnkiportError::Custom(format!("HTTP client build failed: {e}")))
}

pub fn proxied_http_client(timeout: Duration, proxy: Option<&str>) -> Result<Client, AnkiportError> {
    let mut builder = Client::builder().timeout(timeout);
    if let Some(proxy) = proxy {
        let proxy = Proxy::all(proxy)
            .map_err(|e| AnkiportError::Custom(format!("Invalid proxy {proxy}: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| AnkiportError::Custom(format!("HTTP client build failed: {e}")))
}

pub fn ensure_success(resp: &Response) -> Result<(), AnkiportError> {
    if !resp.status().is_success() {
        return Err(AnkiportError::Custom(format!(
            "HTTP error {} from {}",
            resp.status(),
            resp.url()
        )));
    }
    Ok(())
}
