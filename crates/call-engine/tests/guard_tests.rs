//! Origination timeout guard behaviour

mod common;

use std::time::Duration;

use callflow_call_engine::notify::NotificationKind;
use callflow_call_engine::prelude::*;
use common::{channel, count_kind, fast_config, TestEngine};

/// Run the internal-call setup through the dispatcher and return the
/// originated B-leg id
async fn start_internal_call(engine: &TestEngine) -> String {
    engine
        .control
        .add_channel(channel("ch-a", "1002", "1001", Some("call-1"), ChannelState::Ring));
    engine
        .orchestrator
        .handle_event(ControlEvent::SessionStart {
            channel: channel("ch-a", "1002", "1001", Some("call-1"), ChannelState::Ring),
            app: "callflow".to_string(),
            args: vec!["internal".to_string(), "1002".to_string(), "1001".to_string()],
        })
        .await
        .unwrap();

    let originations = engine.control.originations();
    assert_eq!(originations.len(), 1);
    assert_eq!(originations[0].endpoint, "PJSIP/1001");

    // The fake assigned the new channel the next "out-N" id
    engine
        .control
        .list_channels()
        .await
        .unwrap()
        .into_iter()
        .find(|info| info.id.starts_with("out-"))
        .map(|info| info.id)
        .expect("originated leg should exist")
}

#[tokio::test]
async fn answered_call_is_never_forced_down() {
    let mut engine = TestEngine::new(fast_config());
    let b_leg = start_internal_call(&engine).await;
    assert!(engine.orchestrator.guard_is_armed("call-1"));

    // B answers well before the deadline
    engine.control.set_state(&b_leg, ChannelState::Up);
    engine
        .orchestrator
        .handle_event(ControlEvent::StateChange {
            channel_id: b_leg.clone(),
            state: ChannelState::Up,
        })
        .await
        .unwrap();
    assert!(!engine.orchestrator.guard_is_armed("call-1"));

    // Wait past the would-be deadline
    tokio::time::sleep(Duration::from_millis(250)).await;

    let notifications = engine.drain_notifications();
    assert!(notifications
        .iter()
        .all(|n| n.reason.as_deref() != Some("timeout")));
    // Nobody was hung up
    assert!(engine.control.hangups().is_empty());
    // The session survived
    assert!(engine
        .orchestrator
        .registry()
        .get_session("call-1")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn silent_call_gets_exactly_one_timeout_per_leg() {
    let mut engine = TestEngine::new(fast_config());
    let b_leg = start_internal_call(&engine).await;

    // The dispatcher answered A at session-start; rewind it so the whole
    // call reads as unanswered when the guard re-checks
    engine.control.set_state("ch-a", ChannelState::Ringing);
    assert_eq!(
        engine.control.channel(&b_leg).unwrap().state,
        ChannelState::Ringing
    );

    tokio::time::sleep(Duration::from_millis(300)).await;

    // Both legs were forced down with exactly one timeout report each
    let notifications = engine.drain_notifications();
    let timeouts: Vec<_> = notifications
        .iter()
        .filter(|n| n.reason.as_deref() == Some("timeout"))
        .collect();
    assert_eq!(timeouts.len(), 2);
    assert_eq!(count_kind(&notifications, NotificationKind::Hangup, "ch-a"), 1);
    assert_eq!(count_kind(&notifications, NotificationKind::Hangup, &b_leg), 1);

    let mut hangups = engine.control.hangups();
    hangups.sort();
    let mut expected = vec!["ch-a".to_string(), b_leg.clone()];
    expected.sort();
    assert_eq!(hangups, expected);

    // Cleanup ran: session gone, bridge gone
    assert!(engine
        .orchestrator
        .registry()
        .get_session("call-1")
        .await
        .unwrap()
        .is_none());
    assert_eq!(engine.control.bridge_channels("bridge-call-1"), None);
    assert!(!engine.orchestrator.guard_is_armed("call-1"));
}

#[tokio::test]
async fn fire_path_recheck_beats_a_lost_cancellation() {
    let mut engine = TestEngine::new(fast_config());
    let b_leg = start_internal_call(&engine).await;

    // The call connects but the cancel never happens (e.g. the state-change
    // worker lost the race). The guard's own re-check must notice.
    engine.control.set_state(&b_leg, ChannelState::Up);
    assert!(engine.orchestrator.guard_is_armed("call-1"));

    tokio::time::sleep(Duration::from_millis(300)).await;

    let notifications = engine.drain_notifications();
    assert!(notifications
        .iter()
        .all(|n| n.reason.as_deref() != Some("timeout")));
    assert!(engine.control.hangups().is_empty());
}

#[tokio::test]
async fn rearming_replaces_the_previous_timer() {
    let engine = TestEngine::new(fast_config());
    start_internal_call(&engine).await;
    assert!(engine.orchestrator.guard_is_armed("call-1"));

    // A duplicated session-start re-arms rather than stacking timers
    engine
        .orchestrator
        .handle_event(ControlEvent::SessionStart {
            channel: channel("ch-a", "1002", "1001", Some("call-1"), ChannelState::Ring),
            app: "callflow".to_string(),
            args: vec!["internal".to_string(), "1002".to_string(), "1001".to_string()],
        })
        .await
        .unwrap();
    assert!(engine.orchestrator.guard_is_armed("call-1"));
}
