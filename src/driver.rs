//! Tick driver - one task per running session
//!
//! Steps the race on a fixed cadence, renders each snapshot and queues it for
//! the transport. Teardown runs once per session, on whichever path ends it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::game_server::{lock_race, LocationId, SessionId, SessionRegistry, SharedRace};
use crate::render::FrameRenderer;
use crate::store::ScoreStore;
use crate::transport::{Frame, Outbound, OutboundSender};

/// Collaborators shared by every driver
#[derive(Clone)]
pub struct DriverContext {
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<dyn ScoreStore>,
    pub renderer: Arc<dyn FrameRenderer>,
    pub outbound: OutboundSender,
    pub tick_interval: Duration,
}

impl DriverContext {
    /// Start the tick loop for a session.
    ///
    /// Returns `None` when the session is gone or already has a driver.
    pub fn spawn_driver(&self, session: &SessionId) -> Option<JoinHandle<()>> {
        let location = self.registry.location_of(session)?;
        let race = self.registry.get(session)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        if !self.registry.attach_driver(session, shutdown_tx) {
            return None;
        }

        let ctx = self.clone();
        let session = session.clone();
        Some(tokio::spawn(async move {
            ctx.run(session, location, race, shutdown_rx).await;
        }))
    }

    async fn run(
        self,
        session: SessionId,
        location: LocationId,
        race: SharedRace,
        mut shutdown: watch::Receiver<bool>,
    ) {
        log::info!("Starting loop for session {session}");
        loop {
            if *shutdown.borrow() {
                log::info!("Game loop cancelled for session {session}");
                break;
            }

            let tick_start = Instant::now();
            let (snapshot, finish_distance) = {
                let mut race = lock_race(&race);
                if !race.is_running() {
                    break;
                }
                (race.step(), race.config().finish_distance)
            };
            log::debug!(
                "Session {session} tick {} took {:.3}ms",
                snapshot.tick,
                tick_start.elapsed().as_secs_f32() * 1000.0
            );

            let image = self.renderer.render(&snapshot, finish_distance);
            let frame = Frame::for_snapshot(&session, &snapshot, image);
            if self.outbound.send(Outbound::Frame { location, frame }).is_err() {
                log::warn!("Failed to send frame for session {session}: transport closed");
            }

            if snapshot.is_finished() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.tick_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.teardown(&session);
    }

    /// Evict the session, announce the result and flush scores.
    ///
    /// Returns false if another path already tore the session down.
    pub fn teardown(&self, session: &SessionId) -> bool {
        let Some(ended) = self.registry.end_session(session) else {
            return false;
        };

        let (summary, scores, raced) = {
            let mut race = lock_race(&ended.race);
            race.abort();
            let scores: Vec<_> = race
                .players()
                .iter()
                .map(|p| (p.id, p.name.clone(), p.score))
                .collect();
            (race.outcome().to_string(), scores, race.tick() > 0)
        };

        let text = Outbound::Text {
            location: ended.location,
            text: summary,
        };
        if self.outbound.send(text).is_err() {
            log::warn!("Failed to send summary for session {session}: transport closed");
        }

        if raced {
            for (id, name, score) in scores {
                if let Err(e) = self.store.record_score(id, &name, score) {
                    log::error!("Failed to record score for {name}: {e}");
                }
            }
        }

        log::info!("Session cleaned: {session}");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_server::{Actor, RaceConfig};
    use crate::render::TextRenderer;
    use crate::store::JsonStore;
    use crate::transport::{outbound_channel, OutboundReceiver};

    fn context(config: RaceConfig) -> (DriverContext, Arc<JsonStore>, OutboundReceiver) {
        let (outbound, rx) = outbound_channel();
        let store = Arc::new(JsonStore::in_memory());
        let ctx = DriverContext {
            registry: Arc::new(SessionRegistry::new(config)),
            store: store.clone(),
            renderer: Arc::new(TextRenderer::default()),
            outbound,
            tick_interval: Duration::from_millis(1),
        };
        (ctx, store, rx)
    }

    #[test]
    fn teardown_happens_once() {
        let (ctx, _store, mut rx) = context(RaceConfig::default());
        let session = ctx.registry.create_session(3, 1, "ann").unwrap();

        assert!(ctx.teardown(&session));
        assert!(!ctx.teardown(&session));

        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Text {
                location: 3,
                text: "Game over. No winners.".into()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn driver_runs_race_to_completion() {
        let config = RaceConfig {
            finish_distance: 100.0,
            initial_spawn_delay: 10_000,
            ..Default::default()
        };
        let (ctx, store, mut rx) = context(config);
        let session = ctx.registry.create_session(3, 1, "ann").unwrap();
        let race = ctx.registry.get(&session).unwrap();
        lock_race(&race).start(&Actor::player(1)).unwrap();

        let handle = ctx.spawn_driver(&session).unwrap();
        handle.await.unwrap();

        let mut frames = 0;
        let mut summary = None;
        while let Ok(message) = rx.try_recv() {
            match message {
                Outbound::Frame { .. } => frames += 1,
                Outbound::Text { text, .. } => summary = Some(text),
                other => panic!("unexpected message {other:?}"),
            }
        }
        assert!(frames > 10);
        assert_eq!(summary.as_deref(), Some("🏁 Winner: ann!"));
        assert!(ctx.registry.get(&session).is_none());
        assert_eq!(store.top_scores(1).unwrap()[0].0, "ann");
    }

    #[tokio::test]
    async fn shutdown_signal_stops_the_driver() {
        let (mut ctx, _store, mut rx) = context(RaceConfig {
            initial_spawn_delay: 10_000,
            ..Default::default()
        });
        ctx.tick_interval = Duration::from_secs(60);
        let session = ctx.registry.create_session(3, 1, "ann").unwrap();
        let race = ctx.registry.get(&session).unwrap();
        lock_race(&race).start(&Actor::player(1)).unwrap();

        let handle = ctx.spawn_driver(&session).unwrap();
        assert!(ctx.spawn_driver(&session).is_none());
        tokio::task::yield_now().await;
        assert_eq!(ctx.registry.shutdown_all(), 1);
        handle.await.unwrap();

        assert!(lock_race(&race).is_finished());
        assert!(ctx.registry.get(&session).is_none());
        let last = std::iter::from_fn(|| rx.try_recv().ok()).last();
        assert!(matches!(last, Some(Outbound::Text { .. })));
    }

    #[tokio::test]
    async fn closed_transport_does_not_stop_the_race() {
        let config = RaceConfig {
            finish_distance: 60.0,
            initial_spawn_delay: 10_000,
            ..Default::default()
        };
        let (ctx, _store, rx) = context(config);
        drop(rx);
        let session = ctx.registry.create_session(3, 1, "ann").unwrap();
        let race = ctx.registry.get(&session).unwrap();
        lock_race(&race).start(&Actor::player(1)).unwrap();

        ctx.spawn_driver(&session).unwrap().await.unwrap();

        assert_eq!(lock_race(&race).winner().map(|p| p.id), Some(1));
    }
}
