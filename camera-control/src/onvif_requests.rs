use crate::ptz_actuator::Velocity;
use crate::soap::xml_escape;

pub const DEVICE_NS: &str = "http://www.onvif.org/ver10/device/wsdl";
pub const MEDIA_NS: &str = "http://www.onvif.org/ver10/media/wsdl";
pub const PTZ_NS: &str = "http://www.onvif.org/ver20/ptz/wsdl";
pub const IMAGING_NS: &str = "http://www.onvif.org/ver20/imaging/wsdl";
pub const TT_NS: &str = "http://www.onvif.org/ver10/schema";

pub const PAN_TILT_VELOCITY_SPACE: &str =
    "http://www.onvif.org/ver10/tptz/PanTiltSpaces/VelocityGenericSpace";
pub const ZOOM_VELOCITY_SPACE: &str =
    "http://www.onvif.org/ver10/tptz/ZoomSpaces/VelocityGenericSpace";

/// Service a request is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Service {
    Device,
    Media,
    Ptz,
    Imaging,
}

pub struct OnvifRequest {
    pub service: Service,
    pub operation: &'static str,
    pub body: String,
}

impl OnvifRequest {
    pub fn action(&self) -> String {
        let namespace = match self.service {
            Service::Device => DEVICE_NS,
            Service::Media => MEDIA_NS,
            Service::Ptz => PTZ_NS,
            Service::Imaging => IMAGING_NS,
        };
        format!("{namespace}/{}", self.operation)
    }
}

pub fn get_services() -> OnvifRequest {
    build(
        Service::Device,
        "GetServices",
        format!(
            r#"<GetServices xmlns="{DEVICE_NS}"><IncludeCapability>false</IncludeCapability></GetServices>"#
        ),
    )
}

pub fn get_profiles() -> OnvifRequest {
    build(
        Service::Media,
        "GetProfiles",
        format!(r#"<GetProfiles xmlns="{MEDIA_NS}"/>"#),
    )
}

pub fn get_stream_uri(profile: &str) -> OnvifRequest {
    build(
        Service::Media,
        "GetStreamUri",
        format!(
            r#"<GetStreamUri xmlns="{MEDIA_NS}"><StreamSetup><Stream xmlns="{TT_NS}">RTP-Unicast</Stream><Transport xmlns="{TT_NS}"><Protocol>RTSP</Protocol></Transport></StreamSetup><ProfileToken>{profile}</ProfileToken></GetStreamUri>"#,
            profile = xml_escape(profile)
        ),
    )
}

pub fn continuous_move(profile: &str, velocity: Velocity) -> OnvifRequest {
    build(
        Service::Ptz,
        "ContinuousMove",
        format!(
            r#"<ContinuousMove xmlns="{PTZ_NS}"><ProfileToken>{profile}</ProfileToken><Velocity><PanTilt x="{pan}" y="{tilt}" xmlns="{TT_NS}" space="{PAN_TILT_VELOCITY_SPACE}"/><Zoom x="{zoom}" xmlns="{TT_NS}" space="{ZOOM_VELOCITY_SPACE}"/></Velocity></ContinuousMove>"#,
            profile = xml_escape(profile),
            pan = format_float(velocity.pan),
            tilt = format_float(velocity.tilt),
            zoom = format_float(velocity.zoom),
        ),
    )
}

pub fn stop(profile: &str) -> OnvifRequest {
    build(
        Service::Ptz,
        "Stop",
        format!(
            r#"<Stop xmlns="{PTZ_NS}"><ProfileToken>{profile}</ProfileToken><PanTilt>true</PanTilt><Zoom>true</Zoom></Stop>"#,
            profile = xml_escape(profile)
        ),
    )
}

pub fn goto_preset(profile: &str, preset: &str, speed: f32) -> OnvifRequest {
    let speed = format_float(speed);
    build(
        Service::Ptz,
        "GotoPreset",
        format!(
            r#"<GotoPreset xmlns="{PTZ_NS}"><ProfileToken>{profile}</ProfileToken><PresetToken>{preset}</PresetToken><Speed><PanTilt x="{speed}" y="{speed}" xmlns="{TT_NS}"/><Zoom x="{speed}" xmlns="{TT_NS}"/></Speed></GotoPreset>"#,
            profile = xml_escape(profile),
            preset = xml_escape(preset),
        ),
    )
}

pub fn focus_move(video_source: &str, speed: f32) -> OnvifRequest {
    build(
        Service::Imaging,
        "Move",
        format!(
            r#"<Move xmlns="{IMAGING_NS}"><VideoSourceToken>{source}</VideoSourceToken><Focus><Continuous xmlns="{TT_NS}"><Speed>{speed}</Speed></Continuous></Focus></Move>"#,
            source = xml_escape(video_source),
            speed = format_float(speed),
        ),
    )
}

pub fn focus_stop(video_source: &str) -> OnvifRequest {
    build(
        Service::Imaging,
        "Stop",
        format!(
            r#"<Stop xmlns="{IMAGING_NS}"><VideoSourceToken>{source}</VideoSourceToken></Stop>"#,
            source = xml_escape(video_source)
        ),
    )
}

fn build(service: Service, operation: &'static str, body: String) -> OnvifRequest {
    OnvifRequest {
        service,
        operation,
        body,
    }
}

fn format_float(value: f32) -> String {
    let normalized = if value.abs() < f32::EPSILON { 0.0 } else { value };
    format!("{normalized:.3}")
}
