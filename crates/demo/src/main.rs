mod host;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use host::ScriptedHost;
use tacnet::net::{LoopbackTransport, CLOSE_GOING_AWAY};
use tacnet::time::unix_millis;
use tacnet::{GameTransportClient, GeoPosition, SyncClient, SyncConfig};

#[derive(Parser)]
#[command(name = "tacnet-demo")]
#[command(about = "Offline tactical-map sync simulator")]
struct Args {
    #[arg(short, long, default_value_t = 10)]
    duration_secs: u64,

    #[arg(long, default_value_t = 500, help = "Snapshot publish interval in ms")]
    snapshot_ms: u64,

    #[arg(long, default_value_t = 50, help = "Client pump interval in ms")]
    update_ms: u64,

    #[arg(long, help = "Simulate a background/foreground cycle mid-run")]
    suspend: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (transport, peer) = LoopbackTransport::pair();
    let link = peer.clone();
    let mut host = ScriptedHost::new(peer);
    let mut client = SyncClient::new(Box::new(transport), SyncConfig::default());

    client.create_session("alpha")?;
    client.connect("loopback://field");

    let update_ms = args.update_ms.max(1);
    let mut interval = tokio::time::interval(Duration::from_millis(update_ms));
    let total_steps = (args.duration_secs * 1000) / update_ms;
    let snapshot_every = (args.snapshot_ms / update_ms).max(1);
    let report_every = (1000 / update_ms).max(1);
    let suspend_at = total_steps / 2;

    let mut walker = None;
    let mut pin_dropped = false;

    for step in 0..total_steps {
        interval.tick().await;

        client.update();
        host.pump();

        if client.session().is_some() && walker.is_none() {
            let id = host.spawn_walker("bravo");
            log::info!("walker bravo joined the session");
            walker = Some(id);
        }

        if let Some(id) = walker {
            host.walk(id, step);
        }

        if step % snapshot_every == 0 {
            host.publish_snapshot();
        }

        // The local player reports a slow drift north.
        if step % report_every == 0 && client.session().is_some() {
            let mut location =
                GeoPosition::new(48.2080 + step as f64 * 1e-6, 16.3730, unix_millis());
            location.heading = Some(15.0);
            location.speed = Some(1.1);
            if let Err(e) = client.update_location(location) {
                log::warn!("location update rejected: {e}");
            }

            if !pin_dropped && step > report_every * 2 {
                pin_dropped = true;
                host.drop_pin(client.player_id());
            }

            if let Some(world) = client.interpolated() {
                log::info!(
                    "tick {} rendered: {} markers, {} pins, {} pending inputs, rtt {:.1}ms",
                    world.tick,
                    world.players.len(),
                    world.pins.len(),
                    client.pending_inputs(),
                    client.link_stats().rtt_ms,
                );
                for player in &world.players {
                    log::debug!(
                        "  {} at {:.5},{:.5} heading {:?}",
                        player.id,
                        player.latitude,
                        player.longitude,
                        player.heading,
                    );
                }
            }
        }

        if args.suspend && step == suspend_at {
            log::info!("simulating OS suspension of the transport");
            client.enter_background();
            link.close(CLOSE_GOING_AWAY, "app backgrounded");
            client.update();
            client.enter_foreground();
        }

        for event in client.poll_session_events() {
            log::debug!("session event: {event:?}");
        }
    }

    log::info!(
        "run complete at server tick {}; leaving session",
        host.tick()
    );
    client.leave_session()?;
    Ok(())
}
