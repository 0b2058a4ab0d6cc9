use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use dino_race::game_server::lock_race;
use dino_race::transport::outbound_channel;
use dino_race::{
    BotConfig, Command, Dispatcher, Inbound, JsonStore, LocationId, Outbound, PlayerId,
    RaceConfig, ScoreStore, SessionId, TextRenderer,
};

const LOCATION: LocationId = 1;
const NAMES: [&str; 3] = ["Rex", "Trixie", "Spike"];

#[derive(Parser)]
#[command(name = "dino-race")]
#[command(about = "Run a local DinoRace session with autopilot players")]
struct Args {
    #[arg(short, long, default_value_t = 3)]
    players: usize,

    #[arg(short, long, help = "Seed for obstacles and autopilots")]
    seed: Option<u64>,

    #[arg(short, long, default_value_t = 100)]
    tick_ms: u64,

    #[arg(short, long, default_value_t = 1600.0)]
    finish: f32,

    #[arg(long, help = "JSON file for the leaderboard")]
    store: Option<PathBuf>,

    #[arg(long, default_value_t = 0.35, help = "Chance per frame that an autopilot reacts")]
    skill: f64,

    #[arg(short, long, help = "Only print the result")]
    quiet: bool,
}

fn inbound(actor: PlayerId, command: Command) -> Inbound {
    let index = (actor - 1) as usize;
    Inbound {
        actor,
        actor_name: NAMES[index % NAMES.len()].to_string(),
        location: LOCATION,
        location_title: "local".to_string(),
        command,
    }
}

/// Press the jump control for every grounded player close to an obstacle
fn autopilot(bot: &Dispatcher, session: &SessionId, rng: &mut Pcg32, skill: f64) {
    let Some(race) = bot.registry().get(session) else {
        return;
    };
    let presses: Vec<(usize, PlayerId)> = {
        let race = lock_race(&race);
        let reach = race.speed() * race.config().forward_factor * 6.0;
        race.players()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.alive && !p.is_airborne())
            .filter(|(_, p)| {
                race.obstacles()
                    .iter()
                    .map(|o| o.position - p.position)
                    .any(|gap| gap > 0.0 && gap <= reach)
            })
            .map(|(slot, p)| (slot, p.id))
            .collect()
    };

    for (slot, id) in presses {
        if !rng.gen_bool(skill) {
            continue;
        }
        let reply = bot.handle(inbound(
            id,
            Command::Jump {
                session: session.clone(),
                slot,
            },
        ));
        log::debug!("P{} jump: {}", slot + 1, reply.text());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    anyhow::ensure!(
        (1..=NAMES.len()).contains(&args.players),
        "players must be between 1 and {}",
        NAMES.len()
    );

    let config = BotConfig {
        tick_interval: Duration::from_millis(args.tick_ms),
        store_path: args.store.clone(),
        race: RaceConfig {
            finish_distance: args.finish,
            seed: args.seed,
            ..Default::default()
        },
        ..Default::default()
    };

    let store: Arc<dyn ScoreStore> = match &config.store_path {
        Some(path) => Arc::new(
            JsonStore::open(path).with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Arc::new(JsonStore::in_memory()),
    };
    let (outbound, mut frames) = outbound_channel();
    let bot = Dispatcher::new(&config, store, Arc::new(TextRenderer::default()), outbound);

    for actor in 1..=args.players as PlayerId {
        let command = if actor == 1 {
            Command::NewRace
        } else {
            Command::Join
        };
        log::info!("{}", bot.handle(inbound(actor, command)).text());
    }
    log::info!("{}", bot.handle(inbound(1, Command::Start)).text());
    let session = bot
        .registry()
        .session_for_location(LOCATION)
        .context("race ended before it started")?;

    let mut rng = match args.seed {
        Some(seed) => Pcg32::seed_from_u64(seed),
        None => Pcg32::from_entropy(),
    };
    while let Some(message) = frames.recv().await {
        match message {
            Outbound::Frame { frame, .. } => {
                if !args.quiet {
                    println!("{}\n{}", frame.caption, String::from_utf8_lossy(&frame.image));
                }
                autopilot(&bot, &session, &mut rng, args.skill);
            }
            Outbound::Text { text, .. } => {
                println!("{text}");
                break;
            }
            Outbound::Relay { .. } => {}
        }
    }

    println!("{}", bot.handle(inbound(1, Command::Leaderboard)).text());
    log::info!("Server stats: {:?}", bot.registry().stats());
    Ok(())
}
