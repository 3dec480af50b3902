use crate::app_config::{OnvifAuth, Target};
use crate::wsse::UsernameToken;
use anyhow::{bail, Context, Result};
use reqwest::Client;
use roxmltree::Document;

pub struct SoapResponse {
    pub status: u16,
    pub body: String,
}

impl SoapResponse {
    /// Body of a successful response, or the SOAP fault reason.
    pub fn into_success(self, operation: &str) -> Result<String> {
        if self.status < 400 {
            return Ok(self.body);
        }
        match fault_reason(&self.body) {
            Some(reason) => bail!("{operation} failed with HTTP {}: {reason}", self.status),
            None => bail!("{operation} failed with HTTP {}", self.status),
        }
    }
}

pub fn build_client(target: &Target) -> Result<Client> {
    Client::builder()
        .timeout(target.timeout())
        .danger_accept_invalid_certs(target.onvif_insecure())
        .build()
        .context("http client build failed")
}

pub async fn send(
    client: &Client,
    target: &Target,
    endpoint: &str,
    action: &str,
    body: &str,
) -> Result<SoapResponse> {
    let envelope = build_envelope(target, body)?;
    let content_type = format!(r#"application/soap+xml; charset=utf-8; action="{action}""#);
    let mut request = client
        .post(endpoint)
        .header("Content-Type", content_type)
        .body(envelope);
    if target.onvif_auth() == OnvifAuth::Basic {
        let (user, pass) = target.credentials();
        request = request.basic_auth(user, Some(pass));
    }
    let response = request
        .send()
        .await
        .with_context(|| format!("soap request failed for {action} -> {endpoint}"))?;
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    if status >= 400 {
        log::debug!("{action} -> {endpoint}: HTTP {status}\n{body}");
    }
    Ok(SoapResponse { status, body })
}

fn build_envelope(target: &Target, body: &str) -> Result<String> {
    let header = match target.onvif_auth() {
        OnvifAuth::Basic => String::new(),
        OnvifAuth::Wsse => {
            let (user, pass) = target.credentials();
            UsernameToken::generate()?.header(user, pass)
        }
    };
    Ok(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">{header}<s:Body xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">{body}</s:Body></s:Envelope>"#
    ))
}

fn fault_reason(body: &str) -> Option<String> {
    let doc = Document::parse(body).ok()?;
    doc.descendants()
        .find(|node| node.has_tag_name("Reason"))
        .and_then(|reason| reason.descendants().find(|node| node.has_tag_name("Text")))
        .and_then(|node| node.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

pub(crate) fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
