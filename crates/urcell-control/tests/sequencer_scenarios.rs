//! MotionSequencer 场景测试（替身通道）

mod common;

use common::*;
use proptest::prelude::*;
use urcell_control::{
    CancellationToken, ExitReason, GripperAction, MotionSequencer, SequencerConfig,
    SequencerState, StepOutcome, Waypoint, WaypointPlan,
};
use urcell_gripper::GripperError;

type Sequencer = MotionSequencer<ScriptedLink, RecordingGripper>;

fn sequencer(flags: &[i32], plan: WaypointPlan, gripper: RecordingGripper) -> Sequencer {
    MotionSequencer::new(
        ScriptedLink::with_flags(flags),
        gripper,
        recipes(),
        plan,
        fast_config(),
    )
    .unwrap()
}

fn run(sequencer: &mut Sequencer) -> urcell_control::RunReport {
    sequencer.run(&CancellationToken::new()).unwrap()
}

#[test]
fn test_six_waypoints_with_open_set() {
    let mut seq = sequencer(
        &handshake_flags(6),
        plan_with_open_set(6, &[0, 1, 5]),
        RecordingGripper::new(),
    );
    let report = run(&mut seq);

    assert_eq!(report.completed_moves, 6);
    assert_eq!(report.exit, ExitReason::ChannelClosed);
    assert_eq!(seq.loop_state().waypoint_cursor(), 0);
    // 动作表按下标查：0、1、5 张开
    assert_eq!(seq.gripper().positions(), vec![0, 0, 255, 255, 255, 0]);
    assert_eq!(seq.link().setpoint_xs(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
}

#[test]
fn test_six_waypoints_with_explicit_actions() {
    use GripperAction::{Close, Open};
    let actions = [Open, Close, Close, Close, Close, Open];
    let plan = plan_of(
        actions
            .iter()
            .enumerate()
            .map(|(i, &a)| Waypoint::new(pose(i), a))
            .collect(),
    );
    let mut seq = sequencer(&handshake_flags(6), plan, RecordingGripper::new());
    run(&mut seq);

    assert_eq!(seq.gripper().positions(), vec![0, 255, 255, 255, 255, 0]);
    assert_eq!(seq.loop_state().waypoint_cursor(), 0);
}

#[test]
fn test_watchdog_written_every_cycle() {
    let flags = handshake_flags(3);
    let mut seq = sequencer(&flags, plan_with_open_set(4, &[0]), RecordingGripper::new());
    run(&mut seq);

    let link = seq.link();
    // 每个周期：设定点 + 看门狗
    let cycles = link.cycles();
    assert_eq!(cycles.len(), flags.len() + 1);
    for sends in &cycles[..flags.len()] {
        let ids: Vec<_> = sends.iter().map(|i| i.recipe_id()).collect();
        assert_eq!(ids, vec![Some(SETP_ID), Some(WATCHDOG_ID)]);
    }
    // 关闭周期不再发送
    assert!(cycles[flags.len()].is_empty());

    // 1 贯穿 MOVE_SENT，0 贯穿 AWAITING_TRIGGER
    let mut expected: Vec<Option<i32>> = vec![Some(0)];
    for _ in 0..3 {
        expected.extend([Some(1), Some(1), Some(0), Some(0)]);
    }
    expected.push(None);
    assert_eq!(link.watchdog_values(), expected);
}

#[test]
fn test_channel_closed_on_cycle_k() {
    let mut seq = sequencer(&[0, 1, 1], plan_with_open_set(2, &[0]), RecordingGripper::new());
    let report = run(&mut seq);
    assert_eq!(report.cycles, 3);
    assert_eq!(report.exit, ExitReason::ChannelClosed);
    assert!(seq.is_closed());

    // 关闭后再推进也不会产生新的动作
    assert!(matches!(seq.step().unwrap(), StepOutcome::Closed));
    seq.shutdown();

    let link = seq.link();
    assert_eq!(link.count(|e| *e == LinkEvent::Pause), 1);
    assert_eq!(link.count(|e| *e == LinkEvent::Disconnect), 1);
    let tail: Vec<_> = link.events.iter().rev().take(3).rev().cloned().collect();
    assert_eq!(
        tail,
        vec![LinkEvent::Receive, LinkEvent::Pause, LinkEvent::Disconnect]
    );
}

#[test]
fn test_actuator_timeout_is_not_fatal() {
    let mut seq = sequencer(
        &handshake_flags(3),
        plan_with_open_set(3, &[0]),
        RecordingGripper::timing_out_on(&[1]),
    );
    let report = run(&mut seq);

    assert_eq!(report.completed_moves, 3);
    assert_eq!(report.actuator_timeouts, 1);
    assert_eq!(report.exit, ExitReason::ChannelClosed);
    assert_eq!(seq.loop_state().waypoint_cursor(), 0);
    assert_eq!(seq.gripper().positions(), vec![0, 255, 255]);
}

#[test]
fn test_step_reports_gripper_timeout() {
    let mut seq = sequencer(
        &[1],
        plan_with_open_set(2, &[]),
        RecordingGripper::timing_out_on(&[0]),
    );
    match seq.step().unwrap() {
        StepOutcome::Moved {
            waypoint,
            action,
            gripper,
        } => {
            assert_eq!(waypoint, 0);
            assert_eq!(action, GripperAction::Close);
            assert!(matches!(
                gripper,
                Err(GripperError::ActuatorTimeout { target: 255, .. })
            ));
        },
        other => panic!("Expected Moved, got {:?}", other),
    }
    // 超时后仍在 MOVE_SENT，游标已推进
    assert_eq!(seq.loop_state().state(), SequencerState::MoveSent);
    assert_eq!(seq.loop_state().waypoint_cursor(), 1);
    assert_eq!(seq.loop_state().watchdog_value(), 1);
}

#[test]
fn test_fatal_gripper_error_ends_session() {
    let gripper = RecordingGripper {
        fail_on: Some(0),
        ..RecordingGripper::new()
    };
    let mut seq = sequencer(&handshake_flags(2), plan_with_open_set(2, &[0]), gripper);

    let err = seq.run(&CancellationToken::new()).unwrap_err();
    assert!(err.is_fatal());
    let link = seq.link();
    assert_eq!(link.count(|e| *e == LinkEvent::Pause), 1);
    assert_eq!(link.count(|e| *e == LinkEvent::Disconnect), 1);
}

#[test]
fn test_send_failure_ends_session() {
    let mut link = ScriptedLink::with_flags(&handshake_flags(2));
    link.fail_send_at = Some(3);
    let mut seq = MotionSequencer::new(
        link,
        RecordingGripper::new(),
        recipes(),
        plan_with_open_set(2, &[0]),
        fast_config(),
    )
    .unwrap();

    assert!(seq.run(&CancellationToken::new()).is_err());
    assert!(seq.is_closed());
    assert_eq!(seq.link().count(|e| *e == LinkEvent::Disconnect), 1);
}

#[test]
fn test_cancellation_stops_before_receive() {
    let mut seq = sequencer(&handshake_flags(2), plan_with_open_set(2, &[0]), RecordingGripper::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = seq.run(&cancel).unwrap();
    assert_eq!(report.exit, ExitReason::Cancelled);
    assert_eq!(report.cycles, 0);
    assert_eq!(
        seq.link().events,
        vec![LinkEvent::Pause, LinkEvent::Disconnect]
    );
    // 取消不动夹爪
    assert!(seq.gripper().positions().is_empty());
}

#[test]
fn test_cycle_limit() {
    let config = SequencerConfig {
        max_cycles: Some(3),
        ..fast_config()
    };
    let mut seq = MotionSequencer::new(
        ScriptedLink::with_flags(&handshake_flags(4)),
        RecordingGripper::new(),
        recipes(),
        plan_with_open_set(2, &[0]),
        config,
    )
    .unwrap();

    let report = run(&mut seq);
    assert_eq!(report.cycles, 3);
    assert_eq!(report.exit, ExitReason::CycleLimit);
    assert_eq!(seq.link().count(|e| *e == LinkEvent::Receive), 3);
}

#[test]
fn test_held_flag_triggers_once() {
    let mut seq = sequencer(&[1, 1, 1, 1, 2, 1], plan_with_open_set(3, &[]), RecordingGripper::new());
    let report = run(&mut seq);
    assert_eq!(report.completed_moves, 1);
    assert_eq!(seq.loop_state().waypoint_cursor(), 1);
    assert!(seq.loop_state().move_in_progress());
}

#[test]
fn test_speed_slider_initialized() {
    let mut seq = sequencer(&[0], plan_with_open_set(1, &[]), RecordingGripper::new());
    run(&mut seq);

    let recipe = setp_recipe();
    let fraction = recipe.key::<f64>("speed_slider_fraction").unwrap();
    let mask = recipe.key::<u32>("speed_slider_mask").unwrap();
    let setp = seq.link().sent()[0];
    assert_eq!(setp.get(fraction), Some(1.0));
    assert_eq!(setp.get(mask), Some(1));
}

#[test]
fn test_rejects_unknown_fields() {
    let config = SequencerConfig {
        completion_field: "output_int_register_7".to_string(),
        ..fast_config()
    };
    let result = MotionSequencer::new(
        ScriptedLink::default(),
        RecordingGripper::new(),
        recipes(),
        plan_with_open_set(1, &[]),
        config,
    );
    assert!(result.is_err());

    let config = SequencerConfig {
        speed_slider_fraction: Some(1.5),
        ..fast_config()
    };
    let result = MotionSequencer::new(
        ScriptedLink::default(),
        RecordingGripper::new(),
        recipes(),
        plan_with_open_set(1, &[]),
        config,
    );
    assert!(result.err().is_some_and(|e| e.is_config_error()));
}

/// 参考模型：按完成标志序列数触发次数
fn expected_moves(flags: &[i32]) -> usize {
    let mut moving = false;
    let mut moves = 0;
    for &flag in flags {
        if !moving && flag == 1 {
            moving = true;
            moves += 1;
        } else if moving && flag == 0 {
            moving = false;
        }
    }
    moves
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_cursor_law(
        flags in prop::collection::vec(0i32..=1, 0..120),
        len in 1usize..8,
    ) {
        let mut seq = sequencer(&flags, plan_with_open_set(len, &[0]), RecordingGripper::new());
        let report = run(&mut seq);
        let moves = expected_moves(&flags);

        prop_assert_eq!(report.completed_moves as usize, moves);
        prop_assert!(seq.loop_state().waypoint_cursor() < len);
        prop_assert_eq!(seq.loop_state().waypoint_cursor(), moves % len);

        // 每个周期都写看门狗，值与状态一致
        let values = seq.link().watchdog_values();
        prop_assert_eq!(values.len(), flags.len() + 1);
        prop_assert!(values[..flags.len()].iter().all(|v| v.is_some()));
        if let Some(last) = flags.len().checked_sub(1) {
            prop_assert_eq!(values[last], Some(seq.loop_state().watchdog_value()));
        }
    }
}
