//! Walk one encounter through two rounds of initiative negotiation.

use ilaris_core::catalog::EffectChange;
use ilaris_core::session::BatchOutcome;
use ilaris_core::{
    Combatant, CombatantId, DiceCount, HeadlessHost, InitiativeSession, ItemRecord,
    MassInitiativeSession, NegotiationConfig, SessionLocks,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Ilaris initiative ===\n");

    let host = Arc::new(HeadlessHost::new());
    host.add_combatant(Combatant::player("alrik", "Alrik", 8).with_current_initiative(10))
        .await;
    host.add_combatant(Combatant::creature("wolf", "Wolf", 6)).await;
    host.set_library(vec![ItemRecord::action(
        "aim",
        "Aim",
        vec![
            EffectChange::new("system.abgeleitete.ini", "-4"),
            EffectChange::new("system.modifikatoren.at", "2"),
        ],
    )])
    .await;

    let locks = SessionLocks::new();
    let config = NegotiationConfig::default();
    let alrik = CombatantId::from("alrik");
    let wolf = CombatantId::from("wolf");

    for round in 1..=2 {
        println!("-- Round {round} --");

        {
            let mut session =
                InitiativeSession::open(Arc::clone(&host), &locks, &alrik, config.clone()).await?;
            if round == 1 {
                session.select_action("aim").await?;
                session.set_manual_modifier(-12).await?;
            }
            session.set_dice_count(DiceCount::Two).await?;
            let dice = session.roll().await?;
            let best = if dice[0] >= dice[1] { 0 } else { 1 };
            session.select_die(best).await?;
            let result = session.commit().await?;
            println!("{}\n", result.summary);
        }

        let mut batch =
            MassInitiativeSession::open(Arc::clone(&host), &locks, &[wolf.clone()], config.clone())
                .await?;
        batch.roll_all().await?;
        for (id, outcome) in batch.commit_all().await?.outcomes {
            if let BatchOutcome::Committed(result) = outcome {
                println!("{}\n", result.summary);
            } else {
                println!("{id}: {outcome:?}\n");
            }
        }
        drop(batch);

        for expired in host.advance_round().await {
            println!("Effect '{}' on {} expired", expired.label, expired.combatant);
        }
        println!(
            "Turn order: Alrik {:?}, Wolf {:?}\n",
            host.turn_order(&alrik).await,
            host.turn_order(&wolf).await
        );
    }

    for announcement in host.announcements().await {
        println!("[{}] {}", announcement.speaker, announcement.message.lines().next().unwrap_or(""));
    }
    Ok(())
}
