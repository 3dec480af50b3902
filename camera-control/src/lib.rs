pub mod app_config;
pub mod cli;
pub mod key_input;
pub mod motion_controller;
pub mod onvif_camera;
pub mod onvif_parse;
pub mod onvif_requests;
pub mod playback;
pub mod ptz_actuator;
pub mod ptz_console;
pub mod ptz_keys;
pub mod ptz_worker;
pub mod soap;
pub mod stream_monitor;
pub mod stream_session;
pub mod stream_supervisor;
pub mod wsse;
