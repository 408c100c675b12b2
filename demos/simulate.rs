//! Drives a bridge against the mock amplifier and prints what the surfaces show.

use meridian_bridge::mock::MockEnv;
use meridian_bridge::{
    Adapter, Bridge, Configuration, DeviceEvent, Dialect, Request, SurfaceCommand, VolumeMode,
};
use std::time::Duration;

const SETTLE: Duration = Duration::from_millis(50);

fn print_surfaces(env: &MockEnv, label: &str) {
    println!("--- {} ---", label);
    match env.surfaces.volume() {
        Some(v) => println!("  volume: {} (muted: {})", v.volume_value, v.is_muted),
        None => println!("  volume: <none>"),
    }
    match env.surfaces.source() {
        Some(s) => println!("  source: {:?}", s.status),
        None => println!("  source: <none>"),
    }
    if let Some((message, is_error)) = env.status.last() {
        println!("  status: {}{}", message, if is_error { " [error]" } else { "" });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let env = MockEnv::new();
    let mut bridge = Bridge::spawn(Adapter::from_store(env.services())?);
    let handle = bridge.handle();
    tokio::time::sleep(SETTLE).await;
    print_surfaces(&env, "started");

    let config = Configuration {
        connection_target: "/dev/ttyUSB0".to_string(),
        protocol_dialect: Dialect::Tn51,
        ..Configuration::default()
    };
    let outcome = handle.save_settings(config, false).await?;
    println!("Saved settings: {:?}", outcome.status);

    let Some(driver) = env.drivers.latest() else {
        return Err("no driver was created".into());
    };
    driver.emit(DeviceEvent::Connected)?;
    tokio::time::sleep(SETTLE).await;
    print_surfaces(&env, "connected");

    if let Some(volume) = env.surfaces.live_volume() {
        let (request, mut rx) = Request::new();
        handle.command(SurfaceCommand::SetVolume {
            surface: volume.id,
            request,
            mode: VolumeMode::Relative,
            value: 10,
        })?;
        println!("Volume +10: {:?}", rx.recv().await?);
    }
    println!("Driver calls: {:?}", driver.calls());

    driver.emit(DeviceEvent::Volume(55))?;
    driver.emit(DeviceEvent::Source("Muted".to_string()))?;
    tokio::time::sleep(SETTLE).await;
    print_surfaces(&env, "muted at 55");

    driver.emit(DeviceEvent::Source("Standby".to_string()))?;
    tokio::time::sleep(SETTLE).await;
    print_surfaces(&env, "standby");

    driver.emit(DeviceEvent::Disconnected)?;
    tokio::time::sleep(SETTLE).await;
    print_surfaces(&env, "disconnected");

    bridge.stop().await;
    Ok(())
}
