mod common;

use std::time::{Duration, Instant};

use common::{SimDevice, SimNetwork, args, notify, session_on};
use smcp::device::{Axis, DeviceCache, address, group};
use smcp::protocol::{ARG_UNDEF, Command, DriveStatus, Options};
use smcp::session::{Error, ErrorKind, Received, Session, SessionConfig, TimeLimit};
use smcp::transport::MockTransport;

const DEV: u16 = 5;

fn manipulator() -> SimDevice {
    let mut dev = SimDevice::new(DEV, "169.254.0.5:55555");
    dev.positions = vec![1_000_000, 2_000_000, 3_000_000, 4_000_000];
    dev
}

fn open(net: &SimNetwork) -> (Session<MockTransport>, MockTransport) {
    let transport = net.transport();
    let session = session_on(transport.clone(), &SessionConfig::default());
    (session, transport)
}

#[test]
fn test_serial_numbers_survive_resolution() {
    for family in 0..address::SERIAL_FAMILIES {
        for unit in [0, 1, 4095, 8191] {
            let serial = (address::SERIAL_PREFIX + family) * address::SERIAL_DIVISOR + unit;
            let id = address::wire_id(serial).unwrap();
            assert_eq!(address::to_serial(id), Some(serial), "serial {serial}");
        }
    }
}

#[test]
fn test_speed_from_consecutive_updates() {
    let mut cache = DeviceCache::new();
    cache.update_positions(DEV, &[0, 0, 0], 1_000_000);
    cache.update_positions(DEV, &[100_000, 200_000, 300_000], 1_020_000);

    let positions = cache.positions(DEV);
    // nm * 1000 / µs, kept as the devices report it
    assert_eq!(&positions.speed[..3], &[5000.0, 10000.0, 15000.0]);
    assert_eq!(positions.speed[3], 0.0);
    assert_eq!(positions.nm[3], ARG_UNDEF);
    assert_eq!(positions.updated_us, Some(1_020_000));
}

#[test]
fn test_cache_only_read_after_forced_read() {
    let net = SimNetwork::new(vec![manipulator()]);
    let (mut session, mock) = open(&net);

    let forced = session.get_positions(u32::from(DEV), TimeLimit::Force).unwrap();
    assert_eq!(forced.axis(Axis::X), Some(1000.0));
    assert_eq!(forced.axis(Axis::D), Some(4000.0));
    assert_eq!(mock.sent_count(), 1);

    mock.clear_sent();
    let cached = session
        .get_positions(u32::from(DEV), TimeLimit::CacheOnly)
        .unwrap();
    assert_eq!(cached.positions, forced.positions);
    assert_eq!(mock.sent_count(), 0);

    session.get_positions(u32::from(DEV), TimeLimit::Force).unwrap();
    assert_eq!(mock.sent_count(), 1);
    let request = net.requests(DEV).pop().unwrap();
    assert_eq!(request.header().command(), Command::GetPositions.as_u16());
    assert!(request.header().options().has(Options::REQ_RESP));
}

#[test]
fn test_stale_cache_is_refreshed() {
    let net = SimNetwork::new(vec![manipulator()]);
    let (mut session, mock) = open(&net);

    session.get_positions(u32::from(DEV), TimeLimit::Force).unwrap();
    std::thread::sleep(Duration::from_millis(5));
    mock.clear_sent();
    session
        .get_positions(u32::from(DEV), TimeLimit::Millis(1))
        .unwrap();
    assert_eq!(mock.sent_count(), 1);
    session
        .get_positions(u32::from(DEV), TimeLimit::Millis(10_000))
        .unwrap();
    assert_eq!(mock.sent_count(), 1);
}

#[test]
fn test_undefined_axis_keeps_cached_position() {
    let net = SimNetwork::new(vec![manipulator()]);
    let (mut session, mock) = open(&net);
    session.get_positions(u32::from(DEV), TimeLimit::Force).unwrap();

    session
        .goto_position(u32::from(DEV), [10.0, f32::NAN, 30.0, f32::NAN], 100.0, 0, 0)
        .unwrap();
    let goto = net.requests(DEV).pop().unwrap();
    assert_eq!(goto.header().command(), Command::GotoPos.as_u16());
    assert!(goto.header().options().has(Options::REQ_NOTIFY));
    assert_eq!(args(&goto, 0), vec![10_000, ARG_UNDEF, 30_000, ARG_UNDEF, 100]);

    let own = session.own_id();
    mock.inject(
        notify(own, DEV, 900, Command::PositionChanged, &[10_000, ARG_UNDEF, 30_000]),
        net.with_device(DEV, |dev| dev.addr),
    );
    session.receive(0).unwrap();

    let read = session
        .get_positions(u32::from(DEV), TimeLimit::CacheOnly)
        .unwrap();
    assert_eq!(read.axis(Axis::X), Some(10.0));
    assert_eq!(read.axis(Axis::Y), Some(2000.0));
    assert_eq!(read.axis(Axis::Z), Some(30.0));
    assert_eq!(read.axis(Axis::D), Some(4000.0));
}

#[test]
fn test_drive_completion_counted_once() {
    let net = SimNetwork::new(vec![manipulator()]);
    let (mut session, mock) = open(&net);
    let own = session.own_id();
    let from = net.with_device(DEV, |dev| dev.addr);

    session
        .goto_position(u32::from(DEV), [1.0, 2.0, 3.0, f32::NAN], 0.0, 0, 0)
        .unwrap();
    assert_eq!(
        session.get_drive_status(u32::from(DEV)).unwrap(),
        DriveStatus::Busy
    );

    mock.inject(notify(own, DEV, 77, Command::GotoPosCompleted, &[0]), from);
    session.receive(0).unwrap();
    assert_eq!(
        session.get_drive_status(u32::from(DEV)).unwrap(),
        DriveStatus::Completed
    );

    session
        .goto_position(u32::from(DEV), [1.0, 2.0, 3.0, f32::NAN], 0.0, 0, 0)
        .unwrap();
    mock.inject(notify(own, DEV, 77, Command::GotoPosCompleted, &[0]), from);
    session.receive(0).unwrap();
    assert_eq!(
        session.get_drive_status(u32::from(DEV)).unwrap(),
        DriveStatus::Busy
    );

    mock.inject(notify(own, DEV, 78, Command::GotoPosCompleted, &[3]), from);
    session.receive(0).unwrap();
    assert_eq!(
        session.get_drive_status(u32::from(DEV)).unwrap(),
        DriveStatus::Failed
    );
}

#[test]
fn test_stuck_drive_recovery_threshold() {
    let mut cache = DeviceCache::new();
    cache.set_drive_status(DEV, DriveStatus::Busy, 10_000);

    assert_eq!(cache.refresh_drive_status(DEV, 11_000), None);
    assert_eq!(cache.drive_status(DEV), DriveStatus::Busy);

    assert_eq!(cache.refresh_drive_status(DEV, 11_001), Some(1001));
    assert_eq!(cache.drive_status(DEV), DriveStatus::Completed);
}

#[test]
fn test_busy_status_word_holds_drive_busy() {
    let net = SimNetwork::new(vec![manipulator()]);
    let (mut session, mock) = open(&net);
    let own = session.own_id();

    session
        .goto_position(u32::from(DEV), [1.0, 2.0, 3.0, f32::NAN], 0.0, 0, 0)
        .unwrap();
    mock.inject(
        notify(own, DEV, 1, Command::StatusChanged, &[0x11]),
        net.with_device(DEV, |dev| dev.addr),
    );
    session.receive(0).unwrap();
    assert!(session.is_busy(u32::from(DEV)).unwrap());
    assert_eq!(
        session.get_drive_status(u32::from(DEV)).unwrap(),
        DriveStatus::Busy
    );
}

#[test]
fn test_unacknowledged_request_times_out() {
    let mut dev = manipulator();
    dev.silent = true;
    let net = SimNetwork::new(vec![dev]);
    let transport = net.transport();
    let config = SessionConfig::default()
        .with_timeout_ms(90)
        .with_retransmit_count(3);
    let mut session = session_on(transport.clone(), &config);

    let start = Instant::now();
    let err = session.ping(u32::from(DEV)).unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, Error::Timeout));
    assert_eq!(session.last_error(), Some(ErrorKind::Timeout));
    assert_eq!(transport.sent_count(), 3);
    assert!(elapsed >= Duration::from_millis(90), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");

    // nothing is resent once the call has returned
    session.receive(0).unwrap();
    assert_eq!(transport.sent_count(), 3);
}

#[test]
fn test_keyed_reply_must_echo_key() {
    let mut dev = manipulator();
    dev.keyed.insert((Command::GetParameter.as_u16(), 0x105), 4);
    let net = SimNetwork::new(vec![dev]);
    let (mut session, _) = open(&net);

    assert_eq!(session.get_axis_count(u32::from(DEV)).unwrap(), 4);

    net.with_device(DEV, |dev| dev.echo_offset = 1);
    let err = session.get_param(u32::from(DEV), 0x105).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidResponse);
}

#[test]
fn test_cmd_ext_copies_response() {
    let mut dev = manipulator();
    dev.replies
        .insert(Command::GetVersion.as_u16(), vec![1, 2, 3, 4, 5]);
    let net = SimNetwork::new(vec![dev]);
    let (mut session, _) = open(&net);

    let mut resp = [0; 3];
    let count = session
        .cmd_ext(u32::from(DEV), Command::GetVersion, &[], &mut resp)
        .unwrap();
    assert_eq!(count, 5);
    assert_eq!(resp, [1, 2, 3]);
    assert_eq!(session.read_version(u32::from(DEV), 2).unwrap(), vec![1, 2]);
}

#[test]
fn test_device_discovery() {
    let net = SimNetwork::new(vec![
        manipulator(),
        SimDevice::new(0x1001, "169.254.16.1:55555"),
    ]);
    let (mut session, _) = open(&net);

    let devices = session.get_device_list().unwrap();
    assert_eq!(devices, vec![u32::from(DEV), 11_400_001]);
    assert!(session.has_unicast_address(11_400_001).unwrap());

    let ping = net.requests(0x1001).pop().unwrap();
    assert_eq!(ping.header().receiver(), group::ALL_DEVICES);
    assert!(ping.header().options().has(Options::REQ_ACK));

    assert_eq!(session.clear_device_list().unwrap(), 2);
    assert!(!session.has_unicast_address(u32::from(DEV)).unwrap());
}

#[test]
fn test_learned_address_used_for_unicast() {
    let net = SimNetwork::new(vec![manipulator()]);
    let (mut session, mock) = open(&net);

    session.ping(u32::from(DEV)).unwrap();
    assert_eq!(mock.sent()[0].1, session.target());

    mock.clear_sent();
    session.ping(u32::from(DEV)).unwrap();
    assert_eq!(mock.sent()[0].1, net.with_device(DEV, |dev| dev.addr));
}

#[test]
fn test_uma_samples_surface_to_caller() {
    let (mut session, mock) = open(&SimNetwork::default());
    let own = session.own_id();
    mock.inject(
        notify(own, 0x1002, 3, Command::UmaSamples, &[7, 8, 9]),
        "169.254.16.2:55555".parse().unwrap(),
    );
    match session.receive_ext(Duration::ZERO).unwrap() {
        Received::Samples { sender, values } => {
            assert_eq!(sender, 0x1002);
            assert_eq!(values, vec![7, 8, 9]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_open_with_invalid_target() {
    let config = SessionConfig::default().with_target("256.1.1.1");
    let err = Session::open(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Os);
}

#[test]
fn test_closed_session_reports_not_open() {
    let net = SimNetwork::new(vec![manipulator()]);
    let (mut session, mock) = open(&net);
    session.close();
    let err = session.ping(u32::from(DEV)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotOpen);
    assert_eq!(mock.sent_count(), 0);
}
