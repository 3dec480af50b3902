use crate::soap::xml_escape;
use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha1::{Digest, Sha1};
use time::{macros::format_description, OffsetDateTime};

const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
const PASSWORD_DIGEST_TYPE: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
const NONCE_ENCODING: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
const NONCE_LEN: usize = 20;

/// WS-Security UsernameToken with a password digest.
pub struct UsernameToken {
    nonce: Vec<u8>,
    created: String,
}

impl UsernameToken {
    pub fn generate() -> Result<Self> {
        let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].000Z");
        let created = OffsetDateTime::now_utc()
            .format(&format)
            .context("failed to format wsse created timestamp")?;
        let mut nonce = vec![0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        Ok(Self { nonce, created })
    }

    /// Base64(SHA1(nonce + created + password)).
    pub fn digest(&self, password: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(&self.nonce);
        hasher.update(self.created.as_bytes());
        hasher.update(password.as_bytes());
        general_purpose::STANDARD.encode(hasher.finalize())
    }

    pub fn header(&self, username: &str, password: &str) -> String {
        format!(
            r#"<s:Header><Security xmlns="{WSSE_NS}" s:mustUnderstand="1"><UsernameToken><Username>{username}</Username><Password Type="{PASSWORD_DIGEST_TYPE}">{digest}</Password><Nonce EncodingType="{NONCE_ENCODING}">{nonce}</Nonce><Created xmlns="{WSU_NS}">{created}</Created></UsernameToken></Security></s:Header>"#,
            username = xml_escape(username),
            digest = self.digest(password),
            nonce = general_purpose::STANDARD.encode(&self.nonce),
            created = self.created,
        )
    }
}
