//! Periodic player state broadcast for one session.

use crate::session::Session;
use log::{debug, trace};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Spawns the broadcast loop of `session`.
///
/// The task only holds a weak reference, so it never keeps a session alive.
/// It exits once the session is closed or dropped; `Session::close` also
/// aborts it directly.
pub fn spawn(session: &Arc<Session>, period: Duration) -> JoinHandle<()> {
    let session_id = session.id();
    let session = Arc::downgrade(session);

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(session) = session.upgrade() else {
                break;
            };
            if !broadcast_player_states(&session).await {
                break;
            }
        }

        debug!("Broadcaster of session {} stopped", session_id);
    })
}

/// Sends one `PlayerStateNotification` per player to every member.
/// Returns false when the session is closed.
pub async fn broadcast_player_states(session: &Session) -> bool {
    let Some((members, snapshots)) = session.broadcast_view().await else {
        return false;
    };

    trace!(
        "Session {}: {} player states to {} members",
        session.id(),
        snapshots.len(),
        members.len()
    );
    for snapshot in &snapshots {
        session.send_to(&members, &snapshot.to_notification());
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionManager, Outbound, OUTBOUND_QUEUE_CAPACITY};
    use crate::id_generator::IdentifierGenerator;
    use shared::ServerMessage;
    use tokio::sync::mpsc;

    fn setup() -> (Arc<Session>, Arc<ConnectionManager>) {
        let connections = Arc::new(ConnectionManager::new(IdentifierGenerator::sequential(1)));
        let outbound: Arc<dyn Outbound> = connections.clone();
        let session = Arc::new(Session::new(7, "abc", 5, outbound));
        (session, connections)
    }

    fn connect(connections: &ConnectionManager) -> (u32, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let id = connections.register("127.0.0.1:1".parse().unwrap(), tx).id;
        (id, rx)
    }

    #[tokio::test]
    async fn test_broadcast_once_sends_every_player_to_every_member() {
        let (session, connections) = setup();
        let (a, mut rx_a) = connect(&connections);
        let (b, mut rx_b) = connect(&connections);
        session.try_join(a).await.unwrap();
        session.try_join(b).await.unwrap();

        assert!(broadcast_player_states(&session).await);

        for rx in [&mut rx_a, &mut rx_b] {
            let mut ids = Vec::new();
            while let Ok(ServerMessage::PlayerStateNotification { player_id, .. }) = rx.try_recv() {
                ids.push(player_id);
            }
            assert_eq!(ids, vec![a, b]);
        }
    }

    #[tokio::test]
    async fn test_closed_session_stops_broadcast() {
        let (session, _) = setup();
        session.close().await;
        assert!(!broadcast_player_states(&session).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_broadcast() {
        let (session, connections) = setup();
        let (a, mut rx) = connect(&connections);
        session.try_join(a).await.unwrap();

        session.start_broadcasting(Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(650)).await;

        let mut received = 0;
        while let Ok(message) = rx.try_recv() {
            assert!(matches!(message, ServerMessage::PlayerStateNotification { .. }));
            received += 1;
        }
        assert_eq!(received, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_ends_when_session_dropped() {
        let (session, _) = setup();
        let handle = spawn(&session, Duration::from_millis(10));
        drop(session);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }
}
