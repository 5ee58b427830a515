//! ControlChannel 线上测试（对接进程内控制器替身）

use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use urcell_protocol::{
    ControllerVersion, FieldType, MessageType, ProtocolError, Recipe, RecipeInstance,
};

use crate::mock::{ControllerScript, FakeController, ScriptedRecord};
use crate::{ChannelState, CloseReason, ControlChannel, RtdeConfig, RtdeError};

fn state_recipe() -> Recipe {
    Recipe::from_pairs([
        ("actual_TCP_pose", FieldType::Vector6d),
        ("output_int_register_0", FieldType::Int32),
    ])
    .unwrap()
}

fn setp_recipe() -> Recipe {
    Recipe::from_pairs((0..6).map(|i| (format!("input_double_register_{i}"), FieldType::Double)))
        .unwrap()
}

fn watchdog_recipe() -> Recipe {
    Recipe::from_pairs([("input_int_register_0", FieldType::Int32)]).unwrap()
}

fn connected(fake: &FakeController, config: RtdeConfig) -> ControlChannel {
    let mut channel = ControlChannel::new(config);
    channel.connect("127.0.0.1", fake.port()).unwrap();
    channel
}

fn flag_of(instance: &RecipeInstance) -> i32 {
    let key = instance.recipe().key::<i32>("output_int_register_0").unwrap();
    instance.get(key).unwrap()
}

#[test]
fn test_full_session_against_fake_controller() {
    let fake = FakeController::spawn(ControllerScript::with_flags([0, 1, 0])).unwrap();
    let mut channel = connected(&fake, RtdeConfig::default());

    channel.negotiate_version().unwrap();
    assert_eq!(
        channel.controller_version().map(|v| v.to_string()),
        Some("5.11.1.108318".to_string())
    );

    let state = channel.register_output_recipe(state_recipe()).unwrap();
    let setp = channel.register_input_recipe(setp_recipe()).unwrap();
    let watchdog = channel.register_input_recipe(watchdog_recipe()).unwrap();
    assert_eq!((state.id(), setp.id(), watchdog.id()), (1, 2, 3));

    assert!(channel.start().unwrap());
    assert_eq!(channel.state(), ChannelState::Started);

    let mut setp_values = setp.instance();
    let key = setp.recipe().key::<f64>("input_double_register_2").unwrap();
    setp_values.set(key, 0.25).unwrap();
    let wd = watchdog.instance();

    let mut flags = Vec::new();
    while let Some(record) = channel.receive() {
        assert_eq!(record.recipe_id(), Some(state.id()));
        flags.push(flag_of(&record));
        channel.send(&setp_values).unwrap();
        channel.send(&wd).unwrap();
    }
    assert_eq!(flags, vec![0, 1, 0]);
    assert_eq!(channel.close_reason(), Some(&CloseReason::Shutdown));

    channel.pause().unwrap();
    channel.disconnect();
    assert_eq!(channel.state(), ChannelState::Disconnected);
    assert!(channel.output_recipe().is_none());

    let log = fake.join().unwrap();
    let packages = log.data_packages();
    assert_eq!(packages.len(), 6);
    let ids: Vec<u8> = packages.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![2, 3, 2, 3, 2, 3]);
    // 第三个 double（下标 2）为 0.25
    assert_eq!(&packages[0].1[16..24], &0.25f64.to_be_bytes());
}

#[test]
fn test_protocol_version_refused() {
    let fake = FakeController::spawn(ControllerScript {
        accept_protocol: false,
        ..ControllerScript::default()
    })
    .unwrap();
    let mut channel = connected(&fake, RtdeConfig::default());

    let err = channel.negotiate_version().unwrap_err();
    assert!(matches!(err, RtdeError::ProtocolMismatch(_)));

    channel.disconnect();
    assert_eq!(fake.join().unwrap().count(MessageType::GetUrcontrolVersion), 0);
}

#[test]
fn test_controller_too_old() {
    let fake = FakeController::spawn(ControllerScript {
        version: ControllerVersion {
            major: 3,
            minor: 2,
            bugfix: 0,
            build: 18000,
        },
        ..ControllerScript::default()
    })
    .unwrap();
    let mut channel = connected(&fake, RtdeConfig::default());

    match channel.negotiate_version() {
        Err(RtdeError::ProtocolMismatch(msg)) => assert!(msg.contains("3.2.0.18000")),
        other => panic!("Expected ProtocolMismatch, got {:?}", other),
    }
    assert!(channel.controller_version().is_none());
    channel.disconnect();
    fake.join().unwrap();
}

#[test]
fn test_non_positive_frequency_is_rejected() {
    let fake = FakeController::spawn(ControllerScript::default()).unwrap();
    let config = RtdeConfig {
        output_frequency: 0.0,
        ..RtdeConfig::default()
    };
    let mut channel = connected(&fake, config);
    channel.negotiate_version().unwrap();

    assert!(matches!(
        channel.register_output_recipe(state_recipe()),
        Err(RtdeError::InvalidFrequency(f)) if f == 0.0
    ));
    assert!(channel.output_recipe().is_none());
    channel.disconnect();

    let log = fake.join().unwrap();
    assert_eq!(log.count(MessageType::ControlPackageSetupOutputs), 0);
}

#[test]
fn test_unknown_output_field_is_rejected() {
    let fake = FakeController::spawn(ControllerScript::default()).unwrap();
    let mut channel = connected(&fake, RtdeConfig::default());
    channel.negotiate_version().unwrap();

    let recipe = Recipe::from_pairs([
        ("output_int_register_0", FieldType::Int32),
        ("no_such_variable", FieldType::Double),
    ])
    .unwrap();
    match channel.register_output_recipe(recipe) {
        Err(RtdeError::RecipeRejected { field, reason }) => {
            assert_eq!(field, "no_such_variable");
            assert_eq!(reason, "NOT_FOUND");
        },
        other => panic!("Expected RecipeRejected, got {:?}", other),
    }
    assert!(channel.output_recipe().is_none());
    channel.disconnect();
    fake.join().unwrap();
}

#[test]
fn test_declared_type_mismatch_is_rejected() {
    let fake = FakeController::spawn(ControllerScript::default()).unwrap();
    let mut channel = connected(&fake, RtdeConfig::default());
    channel.negotiate_version().unwrap();

    let recipe = Recipe::from_pairs([("output_int_register_0", FieldType::Double)]).unwrap();
    match channel.register_output_recipe(recipe) {
        Err(RtdeError::RecipeRejected { field, reason }) => {
            assert_eq!(field, "output_int_register_0");
            assert!(reason.contains("INT32"));
        },
        other => panic!("Expected RecipeRejected, got {:?}", other),
    }
    channel.disconnect();
    fake.join().unwrap();
}

#[test]
fn test_input_field_in_use_is_rejected() {
    let fake = FakeController::spawn(ControllerScript {
        in_use: vec!["input_int_register_0".into()],
        ..ControllerScript::default()
    })
    .unwrap();
    let mut channel = connected(&fake, RtdeConfig::default());
    channel.negotiate_version().unwrap();

    let err = channel.register_input_recipe(watchdog_recipe()).unwrap_err();
    assert!(matches!(
        err,
        RtdeError::RecipeRejected { ref reason, .. } if reason == "IN_USE"
    ));
    assert!(channel.input_recipes().is_empty());
    channel.disconnect();
    fake.join().unwrap();
}

#[test]
fn test_start_refused_returns_false() {
    let fake = FakeController::spawn(ControllerScript {
        accept_start: false,
        ..ControllerScript::default()
    })
    .unwrap();
    let mut channel = connected(&fake, RtdeConfig::default());
    channel.negotiate_version().unwrap();
    channel.register_output_recipe(state_recipe()).unwrap();

    assert!(!channel.start().unwrap());
    assert_eq!(channel.state(), ChannelState::Connected);

    // 未启动时 receive 不阻塞
    assert!(channel.receive().is_none());
    assert_eq!(channel.close_reason(), Some(&CloseReason::NotStarted));
    channel.disconnect();
    fake.join().unwrap();
}

#[test]
fn test_send_requires_registered_recipe() {
    let fake = FakeController::spawn(ControllerScript::default()).unwrap();
    let mut channel = connected(&fake, RtdeConfig::default());
    channel.negotiate_version().unwrap();
    let watchdog = channel.register_input_recipe(watchdog_recipe()).unwrap();

    let foreign = RecipeInstance::new(std::sync::Arc::new(setp_recipe())).with_recipe_id(7);
    assert!(matches!(
        channel.send(&foreign),
        Err(RtdeError::NotRegistered { recipe_id: Some(7) })
    ));

    // 同一 id，不同 recipe
    let impostor =
        RecipeInstance::new(std::sync::Arc::new(setp_recipe())).with_recipe_id(watchdog.id());
    assert!(matches!(
        channel.send(&impostor),
        Err(RtdeError::NotRegistered { .. })
    ));

    let unbound = RecipeInstance::new(watchdog.recipe().clone());
    assert!(matches!(
        channel.send(&unbound),
        Err(RtdeError::NotRegistered { recipe_id: None })
    ));

    channel.disconnect();
    fake.join().unwrap();
}

#[test]
fn test_stale_records_are_dropped() {
    let fake = FakeController::spawn(ControllerScript {
        burst: true,
        close_when_done: false,
        ..ControllerScript::with_flags([1, 2, 3])
    })
    .unwrap();
    let mut channel = connected(&fake, RtdeConfig::default());
    channel.negotiate_version().unwrap();
    channel.register_output_recipe(state_recipe()).unwrap();
    channel.register_input_recipe(watchdog_recipe()).unwrap();
    assert!(channel.start().unwrap());

    thread::sleep(Duration::from_millis(100));
    let record = channel.receive().unwrap();
    assert_eq!(flag_of(&record), 3);
    assert_eq!(channel.skipped_packages(), 2);

    channel.pause().unwrap();
    assert_eq!(channel.state(), ChannelState::Paused);
    // 幂等
    channel.pause().unwrap();
    channel.disconnect();
    channel.disconnect();

    let log = fake.join().unwrap();
    assert_eq!(log.count(MessageType::ControlPackagePause), 1);
}

#[test]
fn test_text_messages_are_skipped() {
    let fake = FakeController::spawn(ControllerScript {
        records: vec![
            ScriptedRecord::Text("Watchdog is about to expire".into()),
            ScriptedRecord::Flag(1),
        ],
        ..ControllerScript::default()
    })
    .unwrap();
    let mut channel = connected(&fake, RtdeConfig::default());
    channel.negotiate_version().unwrap();
    channel.register_output_recipe(state_recipe()).unwrap();
    let watchdog = channel.register_input_recipe(watchdog_recipe()).unwrap();
    assert!(channel.start().unwrap());

    let record = channel.receive().unwrap();
    assert_eq!(flag_of(&record), 1);
    channel.send(&watchdog.instance()).unwrap();

    assert!(channel.receive().is_none());
    assert_eq!(channel.close_reason(), Some(&CloseReason::Shutdown));
    channel.disconnect();
    fake.join().unwrap();
}

#[test]
fn test_receive_times_out() {
    let fake = FakeController::spawn(ControllerScript {
        close_when_done: false,
        ..ControllerScript::default()
    })
    .unwrap();
    let config = RtdeConfig {
        receive_timeout: Duration::from_millis(100),
        ..RtdeConfig::default()
    };
    let mut channel = connected(&fake, config);
    channel.negotiate_version().unwrap();
    channel.register_output_recipe(state_recipe()).unwrap();
    channel.register_input_recipe(watchdog_recipe()).unwrap();
    assert!(channel.start().unwrap());

    let start = Instant::now();
    assert!(channel.receive().is_none());
    assert!(start.elapsed() >= Duration::from_millis(90));
    assert_eq!(channel.close_reason(), Some(&CloseReason::Timeout));

    channel.pause().unwrap();
    channel.disconnect();
    fake.join().unwrap();
}

#[test]
fn test_malformed_record_ends_exchange() {
    let fake = FakeController::spawn(ControllerScript {
        records: vec![ScriptedRecord::Raw(vec![0, 0, 0])],
        ..ControllerScript::default()
    })
    .unwrap();
    let mut channel = connected(&fake, RtdeConfig::default());
    channel.negotiate_version().unwrap();
    channel.register_output_recipe(state_recipe()).unwrap();
    channel.register_input_recipe(watchdog_recipe()).unwrap();
    assert!(channel.start().unwrap());

    assert!(channel.receive().is_none());
    assert_eq!(
        channel.close_reason(),
        Some(&CloseReason::Malformed(ProtocolError::MalformedRecord {
            expected: 52,
            actual: 3
        }))
    );
    channel.disconnect();
    fake.join().unwrap();
}

#[test]
fn test_connection_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut channel = ControlChannel::new(RtdeConfig::default());
    assert!(matches!(
        channel.connect("127.0.0.1", port),
        Err(RtdeError::Connection(_))
    ));
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[test]
fn test_operations_without_connection() {
    let mut channel = ControlChannel::new(RtdeConfig::default());
    assert!(matches!(
        channel.negotiate_version(),
        Err(RtdeError::NotConnected)
    ));
    assert!(channel.receive().is_none());
    assert_eq!(channel.close_reason(), Some(&CloseReason::NotConnected));
    assert!(channel.pause().is_ok());
    channel.disconnect();
}
