//! Session task tests: two tasks wired through a duplicating bus

mod common;

use std::time::Duration;

use common::{init_tracing, test_protocol};
use flowsession_runtime::{
    BusReceiver, BusSender, ChannelConfig, CounterpartyInfo, FlowCommand, FlowNotification,
    NotificationReceiver, SessionConfig, SessionDriver, SessionId, SessionTask, SessionTaskHandle,
    SystemTimeSource,
};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn spawn_party(party: &str) -> SessionTaskHandle {
    // Generous resend budget: wall-clock scheduling must not exhaust it
    let config = SessionConfig {
        max_resend_attempts: 50,
        ..SessionConfig::testing()
    };
    let driver = SessionDriver::new(
        config,
        test_protocol(),
        CounterpartyInfo::new(party, 4),
        SystemTimeSource,
    );
    let (task, handle) =
        SessionTask::new(driver, &ChannelConfig::testing(), Duration::from_millis(10));
    tokio::spawn(task.run());
    handle
}

/// Forward everything one task publishes to the other, twice
fn spawn_duplicating_link(mut from: BusReceiver, to: BusSender) {
    tokio::spawn(async move {
        while let Some(event) = from.recv().await {
            for copy in [event.clone(), event] {
                if to.send(copy).await.is_err() {
                    return;
                }
            }
        }
    });
}

async fn next_matching(
    notifications: &mut NotificationReceiver,
    pred: impl Fn(&FlowNotification) -> bool,
) -> FlowNotification {
    timeout(WAIT, async {
        loop {
            match notifications.recv().await {
                Some(n) if pred(&n) => return n,
                Some(_) => continue,
                None => panic!("notification channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

#[tokio::test]
async fn test_tasks_complete_a_session_over_duplicating_bus() {
    init_tracing();
    let session_id = SessionId::from_u128(0xB1);

    let mut alice = spawn_party("O=Alice");
    let mut bob = spawn_party("O=Bob");
    spawn_duplicating_link(alice.outbound, bob.inbound.clone());
    spawn_duplicating_link(bob.outbound, alice.inbound.clone());

    let big: Vec<u8> = (0..100u8).collect();
    let commands = [
        FlowCommand::Initiate {
            session_id,
            counterparty: "O=Bob".into(),
        },
        FlowCommand::Send {
            session_id,
            payload: big.clone(),
        },
        FlowCommand::RequestCounterpartyInfo { session_id },
        FlowCommand::Close { session_id },
    ];
    for command in commands {
        alice.commands.send(command).await.expect("alice task running");
    }

    let delivered = next_matching(&mut bob.notifications, |n| {
        matches!(n, FlowNotification::Delivered { .. })
    })
    .await;
    assert_eq!(
        delivered,
        FlowNotification::Delivered {
            session_id,
            payload: big,
        }
    );

    let received = next_matching(&mut alice.notifications, |n| {
        matches!(n, FlowNotification::CounterpartyInfoReceived { .. })
    })
    .await;
    assert!(matches!(
        received,
        FlowNotification::CounterpartyInfoReceived { info, .. } if info.party == "O=Bob"
    ));

    bob.commands
        .send(FlowCommand::Close { session_id })
        .await
        .expect("bob task running");

    for notifications in [&mut alice.notifications, &mut bob.notifications] {
        let closed = next_matching(notifications, |n| {
            matches!(n, FlowNotification::Closed { .. })
        })
        .await;
        assert_eq!(closed.session_id(), session_id);
    }

    for commands in [&alice.commands, &bob.commands] {
        commands.send(FlowCommand::Shutdown).await.expect("task running");
    }
}

#[tokio::test]
async fn test_task_survives_invalid_commands() {
    init_tracing();
    let mut alice = spawn_party("O=Alice");
    let session_id = SessionId::from_u128(0xB2);

    // Unknown session: logged and dropped, the task keeps running
    alice
        .commands
        .send(FlowCommand::Send {
            session_id,
            payload: b"orphan".to_vec(),
        })
        .await
        .expect("task running");

    alice
        .commands
        .send(FlowCommand::Initiate {
            session_id,
            counterparty: "O=Bob".into(),
        })
        .await
        .expect("task running");

    let init = timeout(WAIT, alice.outbound.recv())
        .await
        .expect("timed out waiting for init")
        .expect("outbound channel open");
    assert_eq!(init.session_id, session_id);
    assert_eq!(init.sequence_num, Some(1));

    alice
        .commands
        .send(FlowCommand::Fail {
            session_id,
            kind: "flow.killed".into(),
            message: "operator abort".into(),
        })
        .await
        .expect("task running");

    let errored = next_matching(&mut alice.notifications, |n| {
        matches!(n, FlowNotification::Errored { .. })
    })
    .await;
    assert!(matches!(
        errored,
        FlowNotification::Errored { kind, .. } if kind == "flow.killed"
    ));
}
