//! End-to-end mesh tests over the in-process relay and loopback transport.
//!
//! Covers:
//! - Two members reaching `Connected` without manual intervention
//! - Convergence when the joiner's first `join` is lost, and when one
//!   `offer`, `answer` or the offerer's candidates are lost
//! - Description-before-candidates ordering on the answering side
//! - Voluntary leave and host eviction as seen by both sides
//! - Eviction reaching the target and bystanders when `admin` is lost
//! - A severed transport removing the peer as a transport failure
//! - The same handshake over the room service's WebSocket relay

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use session_controller::actors::{DepartureReason, SessionEvent, SessionHandle};
use session_controller::mesh::LinkState;
use session_controller::participant::ParticipantStatus;
use session_controller::relay::{LocalRelay, RelayHub, SignalRelay};
use session_controller::signaling::{EvictionReason, SdpKind};
use session_controller::transport::LoopbackFactory;
use session_test_utils::{
    next_event, room, wait_until, LossyRelay, RecordingTransportFactory, TestParticipant,
    TestRoomServer, TransportCall,
};

const CONVERGE: Duration = Duration::from_secs(5);

fn local_relay() -> Arc<dyn SignalRelay> {
    Arc::new(LocalRelay::new(RelayHub::new()))
}

async fn connected(a: &SessionHandle, b: &SessionHandle) -> bool {
    let (Ok(a_view), Ok(b_view)) = (a.snapshot().await, b.snapshot().await) else {
        return false;
    };
    a_view.link_state(b.local_id()) == Some(LinkState::Connected)
        && b_view.link_state(a.local_id()) == Some(LinkState::Connected)
}

#[tokio::test]
async fn test_two_participants_reach_connected() {
    let relay = local_relay();
    let code = room("MESH1");

    let (host, _host_task) = TestParticipant::host("Host", relay.clone()).start(&code).await;
    let (guest, _guest_task) = TestParticipant::guest("Guest", relay.clone()).start(&code).await;

    assert!(
        wait_until(CONVERGE, || connected(&host, &guest)).await,
        "host and guest should connect"
    );

    let host_view = host.snapshot().await.unwrap();
    let seen = host_view
        .participants
        .iter()
        .find(|p| &p.id == guest.local_id())
        .expect("host should track the guest");
    assert_eq!(seen.display_name, "Guest");
    assert!(!seen.is_host);

    let guest_view = guest.snapshot().await.unwrap();
    assert!(guest_view
        .participants
        .iter()
        .any(|p| &p.id == host.local_id() && p.is_host));
}

#[tokio::test]
async fn test_mesh_converges_when_first_join_is_lost() {
    let hub = RelayHub::new();
    let reliable: Arc<dyn SignalRelay> = Arc::new(LocalRelay::new(Arc::clone(&hub)));
    let lossy = LossyRelay::new(reliable.clone()).drop_first("join", 1);
    let code = room("LOSSY");

    let (host, _host_task) = TestParticipant::host("Host", reliable).start(&code).await;
    let (guest, _guest_task) = TestParticipant::guest("Guest", Arc::new(lossy.clone()))
        .start(&code)
        .await;

    assert!(
        wait_until(CONVERGE, || connected(&host, &guest)).await,
        "a later join burst or heartbeat should recover the lost announcement"
    );
    assert_eq!(lossy.dropped(), 1);
}

/// Connect a host and a guest where one side publishes through `lossy` and
/// the other through the relay it wraps.
async fn connect_with_lossy_side(code: &str, lossy: LossyRelay, lossy_is_host: bool) -> bool {
    let code = room(code);
    let reliable = lossy.inner();
    let lossy: Arc<dyn SignalRelay> = Arc::new(lossy);
    let (host_relay, guest_relay) = if lossy_is_host {
        (lossy, reliable)
    } else {
        (reliable, lossy)
    };

    let (host, _host_task) = TestParticipant::host("Host", host_relay).start(&code).await;
    let (guest, _guest_task) = TestParticipant::guest("Guest", guest_relay).start(&code).await;

    let converged = wait_until(CONVERGE, || connected(&host, &guest)).await;
    host.cancel();
    guest.cancel();
    converged
}

#[tokio::test]
async fn test_mesh_converges_when_offer_is_lost() {
    let hub = RelayHub::new();
    let lossy = LossyRelay::new(Arc::new(LocalRelay::new(hub))).drop_first("offer", 1);

    assert!(
        connect_with_lossy_side("NOOFR", lossy.clone(), true).await,
        "a repeated join or the handshake deadline should re-send the offer"
    );
    assert_eq!(lossy.dropped(), 1);
}

#[tokio::test]
async fn test_mesh_converges_when_answer_is_lost() {
    let hub = RelayHub::new();
    let lossy = LossyRelay::new(Arc::new(LocalRelay::new(hub))).drop_first("answer", 1);

    assert!(
        connect_with_lossy_side("NOANS", lossy.clone(), false).await,
        "the answerer should repeat its answer when the offer is repeated"
    );
    assert_eq!(lossy.dropped(), 1);
}

#[tokio::test]
async fn test_mesh_converges_when_offerer_candidates_are_lost() {
    let hub = RelayHub::new();
    // The loopback transport gathers two candidates per link
    let lossy = LossyRelay::new(Arc::new(LocalRelay::new(hub))).drop_first("candidate", 2);

    assert!(
        connect_with_lossy_side("NOCND", lossy.clone(), true).await,
        "a repeated answer should make the offerer re-send its candidates"
    );
    assert_eq!(lossy.dropped(), 2);
}

#[tokio::test]
async fn test_three_participants_form_full_mesh() {
    let relay = local_relay();
    let code = room("MESH3");

    let (host, _t1) = TestParticipant::host("Host", relay.clone()).start(&code).await;
    let (a, _t2) = TestParticipant::guest("A", relay.clone()).start(&code).await;
    let (b, _t3) = TestParticipant::guest("B", relay.clone()).start(&code).await;

    let all_pairs = || async {
        connected(&host, &a).await && connected(&host, &b).await && connected(&a, &b).await
    };
    assert!(wait_until(CONVERGE, all_pairs).await, "every pair should connect");
}

#[tokio::test]
async fn test_answering_side_installs_description_before_candidates() {
    let relay = local_relay();
    let code = room("ORDER");
    let transports = Arc::new(RecordingTransportFactory::new());

    let (host, _host_task) = TestParticipant::host("Host", relay.clone())
        .with_transports(transports.clone())
        .start(&code)
        .await;
    let (guest, _guest_task) = TestParticipant::guest("Guest", relay.clone())
        .with_transports(transports.clone())
        .start(&code)
        .await;

    assert!(wait_until(CONVERGE, || connected(&host, &guest)).await);

    let calls = transports.calls_between(guest.local_id(), host.local_id());
    let description_at = calls
        .iter()
        .position(|c| *c == TransportCall::SetRemoteDescription(SdpKind::Offer))
        .expect("guest should install the host's offer");
    let candidates: Vec<(usize, &str)> = calls
        .iter()
        .enumerate()
        .filter_map(|(i, c)| match c {
            TransportCall::AddRemoteCandidate(line) => Some((i, line.as_str())),
            _ => None,
        })
        .collect();

    assert!(!candidates.is_empty(), "guest should apply host candidates");
    assert!(
        candidates.iter().all(|(i, _)| *i > description_at),
        "no candidate may be applied before the remote description: {calls:?}"
    );
    assert!(
        candidates[0].1.starts_with("candidate:0"),
        "candidates should be applied in arrival order: {calls:?}"
    );
}

#[tokio::test]
async fn test_voluntary_leave_removes_participant() {
    let relay = local_relay();
    let code = room("LEAVE");

    let (host, _host_task) = TestParticipant::host("Host", relay.clone()).start(&code).await;
    let (guest, guest_task) = TestParticipant::guest("Guest", relay.clone()).start(&code).await;
    assert!(wait_until(CONVERGE, || connected(&host, &guest)).await);

    let mut host_events = host.subscribe();
    let guest_id = guest.local_id().clone();
    guest.leave().await.unwrap();
    guest_task.await.unwrap();

    let left = next_event(&mut host_events, CONVERGE, |e| {
        matches!(e, SessionEvent::ParticipantLeft { participant, .. } if *participant == guest_id)
    })
    .await
    .expect("host should see the guest leave");
    assert!(matches!(
        left,
        SessionEvent::ParticipantLeft {
            reason: DepartureReason::Voluntary,
            ..
        }
    ));

    let view = host.snapshot().await.unwrap();
    assert!(view.participants.iter().all(|p| p.id != guest_id));
    assert_eq!(view.link_state(&guest_id), None);
}

#[tokio::test]
async fn test_host_eviction_is_terminal_on_both_sides() {
    let relay = local_relay();
    let code = room("EVICT");

    let (host, _host_task) = TestParticipant::host("Host", relay.clone()).start(&code).await;
    let (guest, guest_task) = TestParticipant::guest("Guest", relay.clone()).start(&code).await;
    assert!(wait_until(CONVERGE, || connected(&host, &guest)).await);

    let mut guest_events = guest.subscribe();
    let guest_id = guest.local_id().clone();
    host.evict(guest_id.clone()).await.unwrap();

    let evicted = next_event(&mut guest_events, CONVERGE, |e| {
        matches!(e, SessionEvent::LocallyEvicted { .. })
    })
    .await
    .expect("guest should learn it was evicted");
    assert_eq!(
        evicted,
        SessionEvent::LocallyEvicted {
            by: host.local_id().clone(),
            reason: EvictionReason::HostDecision,
        }
    );
    assert!(next_event(&mut guest_events, CONVERGE, |e| *e == SessionEvent::Ended)
        .await
        .is_some());
    guest_task.await.unwrap();

    let view = host.snapshot().await.unwrap();
    let record = view
        .participants
        .iter()
        .find(|p| p.id == guest_id)
        .expect("kicked participant stays on the roster");
    assert_eq!(record.status, ParticipantStatus::Kicked);
    assert_eq!(view.link_state(&guest_id), None);

    // A second eviction has nothing left to act on
    assert!(host.evict(guest_id).await.is_err());
}

async fn assert_eviction_reaches_everyone(lossy: LossyRelay, code: &str) {
    let code = room(code);
    let reliable = lossy.inner();

    let (host, _t1) = TestParticipant::host("Host", Arc::new(lossy.clone()))
        .start(&code)
        .await;
    let (target, target_task) = TestParticipant::guest("Target", reliable.clone())
        .start(&code)
        .await;
    let (bystander, _t3) = TestParticipant::guest("Bystander", reliable).start(&code).await;

    let all_pairs = || async {
        connected(&host, &target).await
            && connected(&host, &bystander).await
            && connected(&target, &bystander).await
    };
    assert!(wait_until(CONVERGE, all_pairs).await, "every pair should connect");

    let mut target_events = target.subscribe();
    let mut bystander_events = bystander.subscribe();
    let target_id = target.local_id().clone();
    host.evict(target_id.clone()).await.unwrap();

    let evicted = next_event(&mut target_events, CONVERGE, |e| {
        matches!(e, SessionEvent::LocallyEvicted { .. })
    })
    .await
    .expect("target should learn it was evicted");
    assert_eq!(
        evicted,
        SessionEvent::LocallyEvicted {
            by: host.local_id().clone(),
            reason: EvictionReason::HostDecision,
        }
    );
    target_task.await.unwrap();

    let left = next_event(&mut bystander_events, CONVERGE, |e| {
        matches!(e, SessionEvent::ParticipantLeft { participant, .. } if *participant == target_id)
    })
    .await
    .expect("bystander should drop the evicted participant");
    assert_eq!(
        left,
        SessionEvent::ParticipantLeft {
            participant: target_id.clone(),
            reason: DepartureReason::Evicted {
                eviction: EvictionReason::HostDecision
            },
        }
    );

    let view = bystander.snapshot().await.unwrap();
    assert!(view.active_peers().all(|p| p.id != target_id));
    assert_eq!(view.link_state(&target_id), None);
}

#[tokio::test]
async fn test_eviction_survives_lost_admin() {
    let lossy =
        LossyRelay::new(Arc::new(LocalRelay::new(RelayHub::new()))).drop_first("admin", 1);
    assert_eviction_reaches_everyone(lossy.clone(), "NOADM").await;
    assert_eq!(lossy.dropped(), 1);
}

#[tokio::test]
async fn test_eviction_survives_lost_admin_and_first_notice() {
    let lossy = LossyRelay::new(Arc::new(LocalRelay::new(RelayHub::new())))
        .drop_first("admin", 1)
        .drop_first("evicted", 1);
    assert_eviction_reaches_everyone(lossy.clone(), "NOTCE").await;
    assert_eq!(lossy.dropped(), 2);
}

#[tokio::test]
async fn test_severed_transport_removes_peer() {
    let relay = local_relay();
    let code = room("SEVER");
    let transports = Arc::new(LoopbackFactory::new());

    let (host, _host_task) = TestParticipant::host("Host", relay.clone())
        .with_transports(transports.clone())
        .start(&code)
        .await;
    let (guest, _guest_task) = TestParticipant::guest("Guest", relay).start(&code).await;
    assert!(wait_until(CONVERGE, || connected(&host, &guest)).await);

    let mut host_events = host.subscribe();
    let guest_id = guest.local_id().clone();
    assert!(transports.sever(host.local_id(), &guest_id));

    let left = next_event(&mut host_events, CONVERGE, |e| {
        matches!(e, SessionEvent::ParticipantLeft { participant, .. } if *participant == guest_id)
    })
    .await
    .expect("host should drop the peer whose link failed");
    assert_eq!(
        left,
        SessionEvent::ParticipantLeft {
            participant: guest_id.clone(),
            reason: DepartureReason::TransportFailure,
        }
    );

    let view = host.snapshot().await.unwrap();
    assert!(view.participants.iter().all(|p| p.id != guest_id));
    assert_eq!(view.link_state(&guest_id), None);
}

#[tokio::test]
async fn test_guest_cannot_evict() {
    let relay = local_relay();
    let code = room("GUEST");

    let (host, _host_task) = TestParticipant::host("Host", relay.clone()).start(&code).await;
    let (guest, _guest_task) = TestParticipant::guest("Guest", relay.clone()).start(&code).await;
    assert!(wait_until(CONVERGE, || connected(&host, &guest)).await);

    assert!(guest.evict(host.local_id().clone()).await.is_err());
    assert!(connected(&host, &guest).await);
}

#[tokio::test]
async fn test_mesh_over_websocket_relay() {
    let server = TestRoomServer::spawn().await.unwrap();
    let relay: Arc<dyn SignalRelay> = Arc::new(server.relay());
    let code = room("WSOCK");

    let (host, _host_task) = TestParticipant::host("Host", relay.clone()).start(&code).await;
    let (guest, _guest_task) = TestParticipant::guest("Guest", relay.clone()).start(&code).await;

    assert!(
        wait_until(CONVERGE, || connected(&host, &guest)).await,
        "members should connect through the room service relay"
    );
    assert_eq!(server.hub().member_count(&code), 2);
}
