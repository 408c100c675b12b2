use meridian_bridge::mock::{DriverCall, MockDriverHandle, MockEnv, Observed};
use meridian_bridge::{
    Adapter, Configuration, DeviceEvent, DeviceSnapshot, Dialect, LinkState, Request,
    SourceStatus, StartOptions, SurfaceCommand, VolumeMode, NOT_CONFIGURED, VOLUME_MAX,
    VOLUME_MIN,
};

fn serial_config() -> Configuration {
    Configuration {
        connection_target: "/dev/ttyS1".to_string(),
        convenience_source: "TV".to_string(),
        display_source: Some("CD".to_string()),
        ..Configuration::default()
    }
}

fn connect(env: &MockEnv, config: Configuration) -> (Adapter, MockDriverHandle) {
    let mut adapter = Adapter::new(env.services(), config);
    adapter.start();
    let driver = env.drivers.latest().unwrap();
    driver.emit(DeviceEvent::Connected).unwrap();
    adapter.process_pending_events();
    (adapter, driver)
}

/// Index of the first status report matching `is_error`, and of every destroy
fn teardown_order(env: &MockEnv, is_error: bool) -> (usize, Vec<usize>) {
    let status = env
        .journal
        .position(|e| matches!(e, Observed::Status { is_error: err, .. } if *err == is_error))
        .unwrap();
    let destroys = env
        .journal
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Observed::Destroyed(_)))
        .map(|(i, _)| i)
        .collect();
    (status, destroys)
}

fn play(adapter: &mut Adapter, driver: &MockDriverHandle, event: DeviceEvent) {
    driver.emit(event).unwrap();
    adapter.process_pending_events();
}

#[test]
fn test_teardown_is_idempotent() {
    let env = MockEnv::new();
    let (mut adapter, driver) = connect(&env, serial_config());

    adapter.stop_session();
    let calls = driver.calls();
    let statuses = env.status.messages();
    let destroyed = env.surfaces.destroyed();

    adapter.stop_session();
    assert_eq!(driver.calls(), calls);
    assert_eq!(env.status.messages(), statuses);
    assert_eq!(env.surfaces.destroyed(), destroyed);
    assert_eq!(destroyed, 2);
    assert_eq!(adapter.link_state(), LinkState::TornDown);
}

#[test]
fn test_source_projection_after_every_event() {
    for dialect in Dialect::ALL {
        let env = MockEnv::new();
        let config = Configuration {
            connection_target: match dialect {
                Dialect::Zone218 => "10.1.1.2".to_string(),
                _ => "/dev/ttyS1".to_string(),
            },
            protocol_dialect: dialect,
            convenience_source: "CD".to_string(),
            display_source: None,
            ..Configuration::default()
        };
        let (mut adapter, driver) = connect(&env, config);

        let cases = [
            (dialect.standby_sentinel(), SourceStatus::Standby),
            ("CD", SourceStatus::Selected),
            ("LP", SourceStatus::Deselected),
            (dialect.standby_sentinel(), SourceStatus::Standby),
            ("CD", SourceStatus::Selected),
        ];
        for (raw, expected) in cases {
            play(&mut adapter, &driver, DeviceEvent::Source(raw.to_string()));
            assert_eq!(env.surfaces.source().unwrap().status, expected, "{} {}", dialect, raw);
        }
    }
}

#[test]
fn test_mute_never_touches_source_surface() {
    let env = MockEnv::new();
    let (mut adapter, driver) = connect(&env, serial_config());

    for before in ["CD", "LP", "Standby"] {
        play(&mut adapter, &driver, DeviceEvent::Source(before.to_string()));
        let status = env.surfaces.source().unwrap().status;
        play(&mut adapter, &driver, DeviceEvent::Source("Muted".to_string()));
        assert_eq!(env.surfaces.source().unwrap().status, status);
        assert!(env.surfaces.volume().unwrap().is_muted);
    }

    play(&mut adapter, &driver, DeviceEvent::Source("RD".to_string()));
    assert!(!env.surfaces.volume().unwrap().is_muted);
}

#[test]
fn test_relative_volume_clamps() {
    for start in [1, 30, 65, 99] {
        let env = MockEnv::new();
        let (mut adapter, driver) = connect(&env, serial_config());
        play(&mut adapter, &driver, DeviceEvent::Volume(start));

        for (delta, expected) in [(1000, VOLUME_MAX), (-1000, VOLUME_MIN)] {
            let (request, _rx) = Request::new();
            adapter.handle_command(SurfaceCommand::SetVolume {
                surface: adapter.volume_surface_id().unwrap(),
                request,
                mode: VolumeMode::Relative,
                value: delta,
            });
            assert_eq!(driver.calls().last(), Some(&DriverCall::SetVolume(expected)));
        }
    }
}

#[test]
fn test_reconfigure_keeps_link_for_source_changes() {
    let env = MockEnv::new();
    let (mut adapter, driver) = connect(&env, serial_config());
    let volume_id = adapter.volume_surface_id();

    adapter
        .reconfigure(Configuration {
            convenience_source: "RD".to_string(),
            ..serial_config()
        })
        .unwrap();
    assert_eq!(env.drivers.created(), 1);
    assert_eq!(adapter.volume_surface_id(), volume_id);
    assert_eq!(env.surfaces.destroyed(), 0);
    assert_eq!(adapter.link_state(), LinkState::Connected);
    assert!(driver.is_started());

    adapter
        .reconfigure(Configuration {
            connection_target: "/dev/ttyS2".to_string(),
            ..serial_config()
        })
        .unwrap();
    assert_eq!(env.drivers.created(), 2);
    assert_eq!(env.surfaces.destroyed(), 2);
    assert!(!driver.is_started());
}

#[test]
fn test_disconnect_clears_surfaces_and_reports() {
    let env = MockEnv::new();
    let (mut adapter, driver) = connect(&env, serial_config());
    assert!(env.surfaces.volume().is_some());

    play(&mut adapter, &driver, DeviceEvent::Disconnected);
    assert!(env.surfaces.volume().is_none());
    assert!(env.surfaces.source().is_none());
    let (message, is_error) = env.status.last().unwrap();
    assert!(is_error);
    assert!(message.contains("/dev/ttyS1"));

    let (status, destroys) = teardown_order(&env, true);
    assert_eq!(destroys.len(), 2);
    assert!(destroys.iter().all(|&d| status < d));
}

#[test]
fn test_stop_reports_before_destroying() {
    let env = MockEnv::new();
    let (mut adapter, _driver) = connect(&env, serial_config());
    let connected_at = env.journal.entries().len();

    adapter.stop_session();
    let entries = env.journal.entries();
    assert_eq!(
        entries[connected_at],
        Observed::Status {
            message: "Closing connection to Meridian RS232 on \"/dev/ttyS1\"".to_string(),
            is_error: false,
        }
    );
    assert_eq!(entries.len(), connected_at + 3);
    assert!(entries[connected_at + 1..]
        .iter()
        .all(|e| matches!(e, Observed::Destroyed(_))));
}

#[test]
fn test_end_to_end() {
    let env = MockEnv::new();
    let mut adapter = Adapter::new(env.services(), Configuration::default());
    adapter.start();
    assert_eq!(env.status.last(), Some((NOT_CONFIGURED.to_string(), true)));
    assert!(env.surfaces.volumes().is_empty());

    let config = Configuration {
        initial_volume: 40,
        ..serial_config()
    };
    adapter.reconfigure(config).unwrap();
    let driver = env.drivers.latest().unwrap();
    assert_eq!(
        driver.calls(),
        vec![DriverCall::Start {
            target: "/dev/ttyS1".to_string(),
            options: StartOptions {
                volume: 40,
                source: "TV".to_string(),
            },
        }]
    );

    driver.set_snapshot(DeviceSnapshot {
        volume: Some(0),
        source: None,
        connected: false,
    });
    play(&mut adapter, &driver, DeviceEvent::Connected);
    assert_eq!(env.surfaces.volume().unwrap().volume_value, 65);

    let status = env.surfaces.source().unwrap().status;
    play(&mut adapter, &driver, DeviceEvent::Source("Muted".to_string()));
    assert!(env.surfaces.volume().unwrap().is_muted);
    assert_eq!(env.surfaces.source().unwrap().status, status);

    play(&mut adapter, &driver, DeviceEvent::Source("CD".to_string()));
    assert!(!env.surfaces.volume().unwrap().is_muted);
    assert_eq!(env.surfaces.source().unwrap().status, SourceStatus::Selected);
}
