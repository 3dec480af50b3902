use crate::{
    app_config::Target,
    onvif_parse::{self, MediaProfile, ServiceEndpoints},
    onvif_requests::{self, OnvifRequest, Service},
    ptz_actuator::{PtzActuator, Velocity},
    soap,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;

const PRESET_SPEED: f32 = 1.0;

/// One ONVIF camera: discovered service endpoints plus the media profile
/// that PTZ and stream requests are issued against.
pub struct OnvifCamera {
    client: Client,
    target: Target,
    device_endpoint: String,
    endpoints: ServiceEndpoints,
    profile: MediaProfile,
}

impl OnvifCamera {
    pub async fn connect(target: Target) -> Result<Self> {
        let client = soap::build_client(&target)?;
        let device_endpoint = target.onvif_endpoint();
        let mut camera = Self {
            client,
            endpoints: ServiceEndpoints::device_only(&device_endpoint),
            device_endpoint,
            target,
            profile: MediaProfile {
                token: String::new(),
                name: None,
                video_source: None,
                has_ptz: false,
            },
        };
        camera.endpoints = camera.discover_endpoints().await;
        camera.profile = camera.select_profile().await?;
        log::info!(
            "ONVIF profile {} (video source {})",
            camera.profile.token,
            camera.profile.video_source.as_deref().unwrap_or("-")
        );
        Ok(camera)
    }

    pub fn profile_token(&self) -> &str {
        &self.profile.token
    }

    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    pub async fn stream_uri(&self) -> Result<String> {
        let body = self
            .call(onvif_requests::get_stream_uri(&self.profile.token))
            .await?;
        onvif_parse::parse_stream_uri(&body)
    }

    async fn discover_endpoints(&self) -> ServiceEndpoints {
        match self.call(onvif_requests::get_services()).await {
            Ok(body) => match onvif_parse::parse_services(&body, &self.device_endpoint) {
                Ok(endpoints) => endpoints,
                Err(err) => {
                    log::warn!("GetServices parse failed, using device endpoint: {err:#}");
                    ServiceEndpoints::device_only(&self.device_endpoint)
                }
            },
            Err(err) => {
                log::warn!("GetServices failed, using device endpoint: {err:#}");
                ServiceEndpoints::device_only(&self.device_endpoint)
            }
        }
    }

    async fn select_profile(&self) -> Result<MediaProfile> {
        let body = self.call(onvif_requests::get_profiles()).await?;
        let profiles = onvif_parse::parse_profiles(&body)?;
        choose_profile(profiles, self.target.profile_token())
    }

    fn video_source(&self) -> Result<&str> {
        self.profile
            .video_source
            .as_deref()
            .ok_or_else(|| anyhow!("video source token not found for focus control"))
    }

    fn endpoint(&self, service: Service) -> &str {
        match service {
            Service::Device => &self.device_endpoint,
            Service::Media => &self.endpoints.media,
            Service::Ptz => &self.endpoints.ptz,
            Service::Imaging => &self.endpoints.imaging,
        }
    }

    async fn call(&self, request: OnvifRequest) -> Result<String> {
        let endpoint = self.endpoint(request.service);
        let response = soap::send(
            &self.client,
            &self.target,
            endpoint,
            &request.action(),
            &request.body,
        )
        .await?;
        response.into_success(request.operation)
    }
}

#[async_trait]
impl PtzActuator for OnvifCamera {
    async fn continuous_move(&self, velocity: Velocity) -> Result<()> {
        self.call(onvif_requests::continuous_move(&self.profile.token, velocity))
            .await
            .map(drop)
    }

    async fn stop(&self) -> Result<()> {
        self.call(onvif_requests::stop(&self.profile.token))
            .await
            .map(drop)
    }

    async fn start_focus(&self, speed: f32) -> Result<()> {
        let source = self.video_source()?;
        self.call(onvif_requests::focus_move(source, speed))
            .await
            .map(drop)
    }

    async fn stop_focus(&self) -> Result<()> {
        let source = self.video_source()?;
        self.call(onvif_requests::focus_stop(source)).await.map(drop)
    }

    async fn goto_preset(&self, token: &str) -> Result<()> {
        self.call(onvif_requests::goto_preset(
            &self.profile.token,
            token,
            PRESET_SPEED,
        ))
        .await
        .map(drop)
    }
}

/// An explicit token wins; otherwise the first profile with a PTZ
/// configuration, falling back to the first profile.
fn choose_profile(profiles: Vec<MediaProfile>, hint: Option<&str>) -> Result<MediaProfile> {
    if let Some(hint) = hint {
        return profiles
            .into_iter()
            .find(|profile| profile.token == hint)
            .ok_or_else(|| anyhow!("profile token {hint} not offered by camera"));
    }
    let index = profiles
        .iter()
        .position(|profile| profile.has_ptz)
        .unwrap_or(0);
    profiles
        .into_iter()
        .nth(index)
        .ok_or_else(|| anyhow!("Profiles not found"))
}
