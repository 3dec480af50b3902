use anyhow::{Context, Result};
use camera_control::app_config::{self, Target};
use camera_control::cli::{CameraArgs, Cli, Command, PtzArgs};
use camera_control::motion_controller::MotionConfig;
use camera_control::onvif_camera::OnvifCamera;
use camera_control::ptz_console;
use clap::Parser;
use std::io::Write;
use std::time::Duration;

fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();
    match cli.command {
        Command::Ptz(args) => run_ptz(&args),
        Command::StreamUri(args) => print_stream_uri(&args),
    }
}

fn run_ptz(args: &PtzArgs) -> Result<()> {
    let target = Target::from_args(&args.camera)?;
    let config = match &args.key_map {
        Some(path) => app_config::load_motion_config(path)?,
        None => MotionConfig::default(),
    };
    ptz_console::run(target, config, Duration::from_millis(args.call_timeout_ms))
}

fn print_stream_uri(args: &CameraArgs) -> Result<()> {
    let target = Target::from_args(args)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("tokio runtime init failed")?;
    let discovered = runtime.block_on(async {
        let camera = OnvifCamera::connect(target.clone()).await?;
        camera.stream_uri().await
    });
    let discovered = match discovered {
        Ok(uri) => Some(uri),
        Err(err) => {
            log::warn!(
                "camera {}: stream URI discovery failed: {err:#}",
                target.camera_id()
            );
            None
        }
    };
    println!("{}", target.stream_source(discovered.as_deref()).uri());
    Ok(())
}

fn init_logger() {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info");
    env_logger::Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .init();
}
