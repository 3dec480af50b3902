use anyhow::{anyhow, Result};
use roxmltree::{Document, Node};

/// Service endpoints advertised by `GetServices`. Missing services fall back
/// to the device endpoint, which many cameras serve everything from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub media: String,
    pub ptz: String,
    pub imaging: String,
}

impl ServiceEndpoints {
    pub fn device_only(device: &str) -> Self {
        Self {
            media: device.to_string(),
            ptz: device.to_string(),
            imaging: device.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaProfile {
    pub token: String,
    pub name: Option<String>,
    pub video_source: Option<String>,
    pub has_ptz: bool,
}

pub fn parse_services(body: &str, device: &str) -> Result<ServiceEndpoints> {
    let doc = Document::parse(body).map_err(|err| anyhow!("invalid services XML: {err}"))?;
    let find = |needle: &str| {
        doc.descendants()
            .filter(|node| node.has_tag_name("Service"))
            .find_map(|service| {
                let namespace = child_text(service, "Namespace")?;
                if !namespace.contains(needle) {
                    return None;
                }
                select_xaddr(&child_text(service, "XAddr")?)
            })
            .unwrap_or_else(|| device.to_string())
    };
    Ok(ServiceEndpoints {
        media: find("media/wsdl"),
        ptz: find("ptz/wsdl"),
        imaging: find("imaging/wsdl"),
    })
}

pub fn parse_profiles(body: &str) -> Result<Vec<MediaProfile>> {
    let doc = Document::parse(body).map_err(|err| anyhow!("invalid profiles XML: {err}"))?;
    let mut profiles = Vec::new();
    for profile in doc.descendants().filter(|node| node.has_tag_name("Profiles")) {
        let Some(token) = profile.attribute("token") else {
            log::warn!("GetProfiles profile token missing");
            continue;
        };
        let video_source = profile
            .children()
            .find(|node| node.has_tag_name("VideoSourceConfiguration"))
            .and_then(|config| child_text(config, "SourceToken"));
        let has_ptz = profile
            .children()
            .any(|node| node.has_tag_name("PTZConfiguration"));
        profiles.push(MediaProfile {
            token: token.to_string(),
            name: child_text(profile, "Name"),
            video_source,
            has_ptz,
        });
    }
    if profiles.is_empty() {
        return Err(anyhow!("Profiles not found"));
    }
    Ok(profiles)
}

pub fn parse_stream_uri(body: &str) -> Result<String> {
    let doc = Document::parse(body).map_err(|err| anyhow!("invalid stream uri XML: {err}"))?;
    doc.descendants()
        .find(|node| node.has_tag_name("Uri"))
        .and_then(|node| node.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| anyhow!("Stream URI not found"))
}

fn child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn select_xaddr(text: &str) -> Option<String> {
    let candidates: Vec<&str> = text.split_whitespace().collect();
    candidates
        .iter()
        .find(|addr| addr.starts_with("http://"))
        .or_else(|| candidates.iter().find(|addr| addr.starts_with("https://")))
        .or_else(|| candidates.first())
        .map(|addr| addr.to_string())
}
