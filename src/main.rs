use std::env;
use std::path::PathBuf;

use bevy_ecs::prelude::*;
use tracing_subscriber::EnvFilter;

use street_life::core::config::{load_engine_config, EngineConfig};
use street_life::core::ecs::{create_schedule, create_world};
use street_life::core::error::EngineError;
use street_life::simulation::collaborators::PersonalityWeights;
use street_life::simulation::economy::{FinanceState, Money};
use street_life::simulation::engine::ConsequenceEngine;
use street_life::simulation::events::{ConsequenceEvent, ConsequenceEventLog};
use street_life::simulation::memory::ObservedAction;
use street_life::simulation::time::GameTime;
use street_life::simulation::track::{OwnerId, TrackId};
use street_life::world::{EngineDb, SnapshotRepository};

const PLAYER: OwnerId = OwnerId::PLAYER;
const BOSS: OwnerId = OwnerId(1);
const LANDLORD: OwnerId = OwnerId(2);

struct Args {
    config: Option<PathBuf>,
    db: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Initializing Street Life (Consequence Debug)...");
    let args = parse_args(env::args().collect());
    if let Err(err) = run(&args) {
        eprintln!("street-life failed: {}", err);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), EngineError> {
    let mut store: Box<dyn SnapshotRepository> = Box::new(EngineDb::open(&args.db)?);
    let mut snapshot = store.load_or_init(&EngineConfig::default())?;
    if let Some(path) = &args.config {
        snapshot.config = load_engine_config(path)?;
    }
    let engine = ConsequenceEngine::from_snapshot(snapshot)?;
    let mut world = create_world(engine);
    let mut schedule = create_schedule();

    let mut weights = PersonalityWeights::default();
    weights.set(BOSS, "late_for_work", 2.0);
    weights.set(LANDLORD, "late_rent", 1.5);
    {
        let mut finances = world.resource_mut::<FinanceState>();
        finances.record_income(PLAYER, Money::from_dollars(2_400), true);
        finances.record_income(PLAYER, Money::from_dollars(9_000), false);
    }

    for day in 0..7 {
        scripted_day(&mut world, day, &weights);
        for _ in 0..16 {
            schedule.run(&mut world);
            print_events(&world);
        }
        // Sleep through the night in one jump.
        world.resource_mut::<GameTime>().skip_hours(7);
        schedule.run(&mut world);
        print_events(&world);
    }

    let engine = world.resource::<ConsequenceEngine>();
    let time = world.resource::<GameTime>();
    let now = time.now();
    println!("== {} ==", time);
    for track in [
        TrackId::LEGAL_STANDING,
        TrackId::CRIMINAL_STANDING,
        TrackId::PROFESSIONAL,
        TrackId::SOCIAL,
        TrackId::relationship(PLAYER),
    ] {
        let owner = if track.subject.is_some() { BOSS } else { PLAYER };
        println!("{} {}: {:.1}", owner, track, engine.ledger().peek(owner, track, now));
    }
    println!(
        "heat {:.1} ({}), sensitivity x{:.2}",
        engine.heat(PLAYER),
        engine.phase(PLAYER),
        engine.sensitivity(PLAYER)
    );
    for memory in engine.recall(BOSS, 3) {
        println!(
            "boss remembers {} ({}, {:.0})",
            memory.category, memory.tier, memory.current_intensity
        );
    }

    store.save_snapshot(&engine.snapshot())?;
    println!("Saved engine snapshot to {}", args.db.display());
    Ok(())
}

fn scripted_day(world: &mut World, day: u64, weights: &PersonalityWeights) {
    let now = world.resource::<GameTime>().now();
    world.resource_scope(|world, mut engine: Mut<ConsequenceEngine>| {
        let mut finances = world.resource_mut::<FinanceState>();
        match day {
            0 => {
                engine.modify_base(PLAYER, TrackId::LEGAL_STANDING, -30.0, "arrested", now);
                engine.modify_base(PLAYER, TrackId::CRIMINAL_STANDING, 15.0, "arrested", now);
                engine.add_heat(PLAYER, 25.0, "arrest", now, &mut *finances);
                engine.add_modifier(PLAYER, TrackId::SOCIAL, -10.0, 72, "mugshot_online", now);
            }
            2 | 4 => {
                engine.add_heat(PLAYER, 20.0, "flashy_purchase", now, &mut *finances);
                finances.spend(PLAYER, Money::from_dollars(3_000));
            }
            _ => {}
        }
        if day < 4 {
            let late = ObservedAction::new(PLAYER, "late_for_work", 3, -1.0, now);
            engine.observe(BOSS, &late, weights);
        }
        if day == 5 {
            let rent = ObservedAction::new(PLAYER, "late_rent", 6, -1.0, now);
            engine.observe(LANDLORD, &rent, weights);
            engine.reduce_heat(PLAYER, 10.0, Some("arrest"), now);
        }
    });
}

fn print_events(world: &World) {
    let time = world.resource::<GameTime>();
    for event in world.resource::<ConsequenceEventLog>().iter() {
        match event {
            ConsequenceEvent::ValueChanged { .. } => {}
            other => println!("[{}] {:?}", time, other),
        }
    }
}

fn parse_args(args: Vec<String>) -> Args {
    let mut iter = args.iter();
    let mut parsed = Args {
        config: None,
        db: PathBuf::from("./street_life.db"),
    };
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                if let Some(value) = iter.next() {
                    parsed.config = Some(PathBuf::from(value));
                }
            }
            "--db" => {
                if let Some(value) = iter.next() {
                    parsed.db = PathBuf::from(value);
                }
            }
            _ => {}
        }
    }
    parsed
}
