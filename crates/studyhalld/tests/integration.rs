//! Integration tests for studyhalld
//!
//! These tests wire the real presence board, SQLite store, study service and
//! IPC server together the way the daemon does.

use chrono::{Local, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use studyhall_api::{AbortReason, Command, Event, EventPayload, Occupant, ResponsePayload, ResponseResult};
use studyhall_config::Settings;
use studyhall_core::StudyService;
use studyhall_ipc::{IpcClient, IpcServer, ServerMessage};
use studyhall_presence::{ChannelSink, PresenceBoard};
use studyhall_store::{SqliteStore, Store};
use studyhall_util::{ChannelId, MonotonicClock, MonthId, UserId};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

fn channel() -> ChannelId {
    ChannelId::new("study-room")
}

fn occupant(id: &str, org: &str) -> Occupant {
    Occupant::new(id, format!("member-{}", id)).with_organization(org)
}

fn drain(events: &mut mpsc::UnboundedReceiver<Event>) -> Vec<EventPayload> {
    let mut payloads = Vec::new();
    while let Ok(event) = events.try_recv() {
        payloads.push(event.payload);
    }
    payloads
}

#[tokio::test(start_paused = true)]
async fn late_joiner_and_leaver_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("studyhall.db");

    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let board = Arc::new(PresenceBoard::new());
    let (sink, mut events) = ChannelSink::new();
    let anchor = Local.with_ymd_and_hms(2025, 5, 14, 19, 0, 0).unwrap();
    let service = StudyService::new(Settings::default(), store.clone(), board.clone(), Arc::new(sink))
        .with_clock(Arc::new(MonotonicClock::anchored_at(anchor)));
    let t0 = Instant::now();

    board
        .update(channel(), vec![occupant("A", "VTK"), occupant("C", "VTK")])
        .unwrap();
    service
        .start_session(channel(), "Study Room".into(), Some(25), Some(5))
        .await
        .unwrap();

    // B walks in just before the 10 minute scan
    sleep_until(t0 + Duration::from_secs(595)).await;
    board
        .update(
            channel(),
            vec![occupant("A", "VTK"), occupant("C", "VTK"), occupant("B", "Wina")],
        )
        .unwrap();

    // C leaves at 20 minutes
    sleep_until(t0 + Duration::from_secs(1200)).await;
    board
        .update(channel(), vec![occupant("A", "VTK"), occupant("B", "Wina")])
        .unwrap();

    sleep_until(t0 + Duration::from_secs(1900)).await;
    assert!(service.list_active_sessions().is_empty());

    let minutes = |user: &str| -> Vec<u32> {
        store
            .get_session_records(&UserId::new(user), Some(2025), Some(5))
            .unwrap()
            .iter()
            .map(|r| r.duration_minutes)
            .collect()
    };
    assert_eq!(minutes("A"), vec![25]);
    assert_eq!(minutes("B"), vec![15]);
    assert!(minutes("C").is_empty());

    let month = MonthId::new(2025, 5).unwrap();
    let report = service.get_leaderboard(Some(month)).unwrap();
    let totals: Vec<(&str, u64)> = report
        .organizations
        .iter()
        .map(|o| (o.organization.as_str(), o.total_minutes))
        .collect();
    assert_eq!(totals, vec![("VTK", 25), ("Wina", 15)]);
    assert_eq!(report.top_individuals[0].user_id, UserId::new("A"));
    assert_eq!(report.top_individuals[1].minutes, 15);

    let payloads = drain(&mut events);
    assert!(matches!(payloads.first(), Some(EventPayload::SessionStarted { .. })));
    assert!(matches!(payloads.last(), Some(EventPayload::SessionCompleted { .. })));

    let late: Vec<_> = payloads
        .iter()
        .filter_map(|p| match p {
            EventPayload::LateJoiner {
                user_id,
                minutes_late,
                potential_credit,
                ..
            } => Some((user_id.clone(), *minutes_late, *potential_credit)),
            _ => None,
        })
        .collect();
    assert_eq!(late, vec![(UserId::new("B"), 10, 15)]);

    let summary = payloads
        .iter()
        .find_map(|p| match p {
            EventPayload::CreditAwarded { summary, .. } => Some(summary.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(summary.left_early, 1);
    assert_eq!(summary.total_minutes(), 40);

    let mentions = payloads
        .iter()
        .find_map(|p| match p {
            EventPayload::BreakStarted { mentions, .. } => Some(mentions.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(mentions, vec![UserId::new("A"), UserId::new("B")]);

    // Everything settled is on disk
    drop(service);
    drop(store);
    let reopened = SqliteStore::open(&db_path).unwrap();
    let stats = reopened.storage_stats().unwrap();
    assert_eq!(stats.total_sessions, 2);
    let aggregate = reopened.get_monthly_aggregate(month).unwrap().unwrap();
    assert_eq!(aggregate.total_minutes(), 40);
}

#[tokio::test(start_paused = true)]
async fn channels_run_independently() {
    let board = Arc::new(PresenceBoard::new());
    let (sink, _events) = ChannelSink::new();
    let service = StudyService::new(
        Settings::default(),
        Arc::new(SqliteStore::in_memory().unwrap()),
        board.clone(),
        Arc::new(sink),
    );

    let east = ChannelId::new("east");
    let west = ChannelId::new("west");
    board.update(east.clone(), vec![occupant("1", "VTK")]).unwrap();
    board.update(west.clone(), vec![occupant("2", "Medica")]).unwrap();

    service
        .start_session(east.clone(), "East".into(), Some(10), Some(0))
        .await
        .unwrap();
    service
        .start_session(west.clone(), "West".into(), Some(30), Some(0))
        .await
        .unwrap();
    assert_eq!(service.list_active_sessions().len(), 2);

    tokio::time::sleep(Duration::from_secs(11 * 60)).await;
    let active = service.list_active_sessions();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].channel_id, west);

    // The finished channel can host a new session
    service
        .start_session(east, "East".into(), Some(10), Some(0))
        .await
        .unwrap();
}

async fn serve(service: Arc<StudyService>, events: mpsc::UnboundedReceiver<Event>, socket: &std::path::Path) -> Arc<IpcServer> {
    let mut ipc = IpcServer::new(socket);
    ipc.start().await.unwrap();
    let ipc = Arc::new(ipc);

    let accept = ipc.clone();
    tokio::spawn(async move {
        let _ = accept.run().await;
    });

    let fanout = ipc.clone();
    let mut events = events;
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            fanout.broadcast_event(event);
        }
    });

    let mut messages = ipc.take_message_receiver().await.unwrap();
    let responder = ipc.clone();
    tokio::spawn(async move {
        while let Some(msg) = messages.recv().await {
            let ServerMessage::Request { client_id, request } = msg else {
                continue;
            };
            let payload = match request.command {
                Command::SubscribeEvents => ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
                Command::StopSession { channel_id } => ResponsePayload::SessionStopping {
                    session_id: service.stop_session(&channel_id).unwrap(),
                },
                _ => ResponsePayload::Pong,
            };
            let _ = responder
                .send_response(
                    &client_id,
                    studyhall_api::Response::success(request.request_id, payload),
                )
                .await;
        }
    });

    ipc
}

#[tokio::test]
async fn subscribed_gateway_sees_session_events() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("studyhalld.sock");

    let board = Arc::new(PresenceBoard::new());
    let (sink, events) = ChannelSink::new();
    let service = Arc::new(StudyService::new(
        Settings::default(),
        Arc::new(SqliteStore::in_memory().unwrap()),
        board.clone(),
        Arc::new(sink),
    ));
    let _ipc = serve(service.clone(), events, &socket).await;

    let mut gateway = IpcClient::connect(&socket).await.unwrap();
    let mut stream = IpcClient::connect(&socket)
        .await
        .unwrap()
        .subscribe()
        .await
        .unwrap();

    board.update(channel(), vec![occupant("1", "VTK")]).unwrap();
    let started = service
        .start_session(channel(), "Study Room".into(), None, None)
        .await
        .unwrap();

    let response = gateway
        .send(Command::StopSession { channel_id: channel() })
        .await
        .unwrap();
    match response.result {
        ResponseResult::Ok(ResponsePayload::SessionStopping { session_id }) => {
            assert_eq!(session_id, started.session_id)
        }
        other => panic!("unexpected response: {:?}", other),
    }

    let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first.payload, EventPayload::SessionStarted { .. }));
    assert_eq!(first.channel_id(), Some(&channel()));

    let aborted = loop {
        let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap();
        if let EventPayload::SessionAborted { reason, .. } = event.payload {
            break reason;
        }
    };
    assert_eq!(aborted, AbortReason::Cancelled);
}
