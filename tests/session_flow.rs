use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use dino_race::game_server::lock_race;
use dino_race::transport::{outbound_channel, OutboundReceiver};
use dino_race::{
    BotConfig, Command, Dispatcher, Inbound, JsonStore, Outbound, PlayerId, RaceConfig,
    ScoreStore, SessionId, TextRenderer,
};

const CHAT: i64 = -42;

fn bot(race: RaceConfig) -> (Arc<Dispatcher>, Arc<JsonStore>, OutboundReceiver) {
    let config = BotConfig {
        tick_interval: Duration::from_millis(1),
        owner_id: Some(7),
        race,
        ..Default::default()
    };
    let store = Arc::new(JsonStore::in_memory());
    let (outbound, rx) = outbound_channel();
    let bot = Dispatcher::new(
        &config,
        store.clone(),
        Arc::new(TextRenderer::default()),
        outbound,
    );
    (Arc::new(bot), store, rx)
}

fn send(bot: &Dispatcher, actor: PlayerId, name: &str, command: Command) -> String {
    bot.handle(Inbound {
        actor,
        actor_name: name.to_string(),
        location: CHAT,
        location_title: "dino club".to_string(),
        command,
    })
    .text()
    .to_string()
}

/// Drain outbound messages until the end-of-race summary arrives
async fn summary(rx: &mut OutboundReceiver) -> (usize, String) {
    let mut frames = 0;
    loop {
        let message = timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("race did not finish in time")
            .expect("outbound channel closed");
        match message {
            Outbound::Frame { location, frame } => {
                assert_eq!(location, CHAT);
                assert!(frame.caption.starts_with("Tick "));
                assert_eq!(frame.controls.last().unwrap().label, "End Early");
                frames += 1;
            }
            Outbound::Text { location, text } => {
                assert_eq!(location, CHAT);
                return (frames, text);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}

fn session(bot: &Dispatcher) -> SessionId {
    bot.registry().session_for_location(CHAT).unwrap()
}

#[tokio::test]
async fn full_race_records_scores_and_frees_the_chat() {
    let (bot, store, mut rx) = bot(RaceConfig {
        finish_distance: 300.0,
        initial_spawn_delay: 10_000,
        ..Default::default()
    });

    send(&bot, 1, "ann", Command::NewRace);
    assert_eq!(send(&bot, 2, "bo", Command::Join), "bo joined the race. (2/3)");
    assert_eq!(
        send(&bot, 2, "bo", Command::Start),
        "Only the session creator can start."
    );
    assert!(send(&bot, 1, "ann", Command::Start).starts_with("Game starting!"));
    assert_eq!(send(&bot, 1, "ann", Command::Start), "Game already running.");

    let (frames, text) = summary(&mut rx).await;
    assert!(frames > 40);
    assert_eq!(text, "🏁 Winner: ann!");

    assert!(bot.registry().session_for_location(CHAT).is_none());
    let top = store.top_scores(10).unwrap();
    assert_eq!(top.len(), 2);
    assert!(top.iter().all(|(_, score)| *score >= 300));
    assert_eq!(store.all_locations().unwrap(), vec![CHAT]);

    assert!(send(&bot, 2, "bo", Command::NewRace).starts_with("New race `"));
}

#[tokio::test]
async fn end_early_stops_a_running_race_once() {
    let (bot, _store, mut rx) = bot(RaceConfig {
        finish_distance: 1_000_000.0,
        initial_spawn_delay: 10_000,
        ..Default::default()
    });
    send(&bot, 1, "ann", Command::NewRace);
    send(&bot, 1, "ann", Command::Start);
    let id = session(&bot);

    // Let a few ticks through before ending
    for _ in 0..3 {
        let message = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(message, Some(Outbound::Frame { .. })));
    }
    assert_eq!(
        send(&bot, 1, "ann", Command::EndEarly { session: id.clone() }),
        "Ending session..."
    );

    let (_, text) = summary(&mut rx).await;
    assert!(text.starts_with("Game over. Top: ann — "), "{text}");
    assert!(bot.registry().get(&id).is_none());
    assert_eq!(
        send(&bot, 1, "ann", Command::EndEarly { session: id }),
        "Session not found."
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err(), "summary sent more than once");
}

#[tokio::test]
async fn jumps_from_concurrent_tasks_apply_between_ticks() {
    let (bot, _store, mut rx) = bot(RaceConfig {
        finish_distance: 800.0,
        seed: Some(3),
        ..Default::default()
    });
    send(&bot, 1, "ann", Command::NewRace);
    send(&bot, 2, "bo", Command::Join);
    send(&bot, 3, "cy", Command::Join);
    send(&bot, 1, "ann", Command::Start);
    let id = session(&bot);

    let mut presses = Vec::new();
    for slot in 0..3usize {
        let bot = Arc::clone(&bot);
        let id = id.clone();
        presses.push(tokio::spawn(async move {
            let actor = slot as PlayerId + 1;
            let mut accepted = 0;
            while bot.registry().get(&id).is_some() {
                let reply = send(
                    &bot,
                    actor,
                    "p",
                    Command::Jump {
                        session: id.clone(),
                        slot,
                    },
                );
                if reply == "Jumped!" {
                    accepted += 1;
                }
                tokio::time::sleep(Duration::from_micros(300)).await;
            }
            accepted
        }));
    }

    let (_, text) = summary(&mut rx).await;
    for press in presses {
        assert!(press.await.unwrap() > 0);
    }
    // Constant jumping keeps every player clear of the ground
    assert_eq!(text, "🏁 Winner: ann!");
}

#[tokio::test]
async fn owner_shutdown_stops_all_games() {
    let (bot, _store, mut rx) = bot(RaceConfig {
        finish_distance: 1_000_000.0,
        initial_spawn_delay: 10_000,
        ..Default::default()
    });
    send(&bot, 1, "ann", Command::NewRace);
    send(&bot, 1, "ann", Command::Start);
    let id = session(&bot);
    let race = bot.registry().get(&id).unwrap();

    assert_eq!(
        send(&bot, 7, "owner", Command::Shutdown),
        "Shutting down bot and stopping all games..."
    );

    let (_, text) = summary(&mut rx).await;
    assert!(text.starts_with("Game over."));
    assert!(lock_race(&race).is_finished());
    assert!(bot.is_stopping());
    assert_eq!(send(&bot, 1, "ann", Command::NewRace), "Bot is shutting down.");
}

#[tokio::test]
async fn owner_broadcast_reaches_every_known_chat() {
    let (bot, _store, mut rx) = bot(RaceConfig::default());
    bot.observe(100, "a");
    bot.observe(200, "b");
    send(&bot, 1, "ann", Command::Help);

    assert_eq!(
        send(&bot, 7, "owner", Command::Broadcast("race night".into())),
        "Broadcast sent to 3/3 chats."
    );

    let mut targets = Vec::new();
    while let Ok(Outbound::Text { location, text }) = rx.try_recv() {
        assert_eq!(text, "📣 Broadcast:\n\nrace night");
        targets.push(location);
    }
    targets.sort();
    assert_eq!(targets, vec![CHAT, 100, 200]);
}

#[tokio::test]
async fn owner_podcast_relays_the_next_media_message() {
    let (bot, _store, mut rx) = bot(RaceConfig::default());
    bot.observe(100, "a");
    bot.observe(200, "b");
    send(&bot, 1, "ann", Command::Help);

    assert_eq!(
        send(&bot, 7, "owner", Command::Podcast("episode 3".into())),
        "Send the audio/voice/document now. I will broadcast it to all saved chats."
    );
    assert!(rx.try_recv().is_err());
    assert_eq!(
        send(&bot, 7, "owner", Command::Media { message_id: 55 }),
        "Podcast broadcasted to 3/3 chats."
    );

    let mut targets = Vec::new();
    while let Ok(message) = rx.try_recv() {
        let (location, source_location, message_id, caption) = match message {
            Outbound::Relay {
                location,
                source_location,
                message_id,
                caption,
            } => (location, source_location, message_id, caption),
            other => panic!("unexpected message {other:?}"),
        };
        assert_eq!((source_location, message_id), (CHAT, 55));
        assert_eq!(caption.as_deref(), Some("episode 3"));
        targets.push(location);
    }
    targets.sort();
    assert_eq!(targets, vec![CHAT, 100, 200]);

    // The pending caption is used up by the first media message
    assert_eq!(send(&bot, 7, "owner", Command::Media { message_id: 56 }), "");
    assert!(rx.try_recv().is_err());
}
