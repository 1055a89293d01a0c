//! callback-mux demo host.
//!
//! Drives a client dispatcher (and optionally a game-server dispatcher)
//! once per tick against in-memory transports, then prints the final
//! counters as JSON.

use std::cell::Cell;
use std::rc::Rc;

use bytes::{Buf, BufMut, BytesMut};
use tracing_subscriber::EnvFilter;

use callback_mux::channel::{CallResult, Callback};
use callback_mux::config::DispatchConfig;
use callback_mux::domain::{KindTag, OperationHandle, Payload, Registry, Shape};
use callback_mux::service::Dispatcher;
use callback_mux::transport::{CallFailure, LoopbackTransport};

/// Broadcast: a player entered the session.
#[derive(Debug)]
struct PlayerJoined {
    player: u64,
}

impl PlayerJoined {
    const KIND: KindTag = KindTag::new(304);

    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u64_le(self.player);
        buf
    }
}

impl Payload for PlayerJoined {
    const SHAPE: Shape = Shape::tagged("PlayerJoined", 304, 8);

    fn decode(mut raw: &[u8]) -> Self {
        Self {
            player: raw.get_u64_le(),
        }
    }
}

/// Async result: rank of the local player on a leaderboard.
#[derive(Debug)]
struct RankLookup {
    rank: u32,
}

impl RankLookup {
    const KIND: KindTag = KindTag::new(1105);

    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_u32_le(self.rank);
        buf
    }
}

impl Payload for RankLookup {
    const SHAPE: Shape = Shape::tagged("RankLookup", 1105, 4);

    fn decode(mut raw: &[u8]) -> Self {
        Self {
            rank: raw.get_u32_le(),
        }
    }
}

/// Rank lookup issued on one tick and answered on the next.
///
/// Every tenth tick the answer fails and the result is lost. The channel
/// then still reports the lost handle as active, so the poller cancels it
/// before issuing the next lookup.
#[derive(Debug)]
struct RankPoller {
    lookup: CallResult<RankLookup>,
    answered: Option<OperationHandle>,
}

impl RankPoller {
    fn new(lookup: CallResult<RankLookup>) -> Self {
        Self {
            lookup,
            answered: None,
        }
    }

    fn step(&mut self, transport: &mut LoopbackTransport, tick: u64) -> anyhow::Result<()> {
        if self.lookup.is_active() && self.answered == Some(self.lookup.handle()) {
            tracing::debug!(handle = %self.lookup.handle(), "rank lookup lost, reissuing");
            self.lookup.cancel();
        }

        if self.lookup.is_active() {
            let handle = self.lookup.handle();
            if tick % 10 == 0 {
                transport.fail_call(handle, CallFailure::NetworkFailure);
            } else {
                let rank = u32::try_from(tick).unwrap_or(u32::MAX);
                transport.complete_call(handle, RankLookup::KIND, RankLookup { rank }.encode(), false);
            }
            self.answered = Some(handle);
        } else {
            let handle = transport.issue_call();
            self.lookup.bind(handle)?;
        }
        Ok(())
    }
}

/// Feeds the client transport: a join every third tick plus one rank
/// lookup step.
fn simulate(
    dispatcher: &mut Dispatcher<LoopbackTransport>,
    poller: &mut RankPoller,
    tick: u64,
) -> anyhow::Result<()> {
    let transport = dispatcher.transport_mut();
    if tick % 3 == 0 {
        transport.push_event(PlayerJoined::KIND, PlayerJoined { player: tick }.encode());
    }
    poller.step(transport, tick)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = DispatchConfig::from_env();
    tracing::info!(
        drain_limit = config.drain_limit,
        tick_ms = config.tick_interval_ms,
        game_server = config.game_server_enabled,
        max_ticks = config.max_ticks,
        "starting callback-mux host"
    );

    // Build dispatchers
    let registry = Registry::new();
    let mut client = Dispatcher::client(LoopbackTransport::new(), registry.clone(), &config);
    let mut server = config.game_server_enabled.then(|| {
        Dispatcher::game_server(LoopbackTransport::new(), registry.sibling(), &config)
    });

    // Register channels
    let joins = Rc::new(Cell::new(0u64));
    let join_count = Rc::clone(&joins);
    let _presence = Callback::<PlayerJoined>::new(&registry, move |event| {
        join_count.set(join_count.get().saturating_add(1));
        tracing::info!(player = event.player, "player joined");
    })?;

    let lookup = CallResult::<RankLookup>::with_callback(&registry, |result, io_failure| {
        if io_failure {
            tracing::warn!(rank = result.rank, "rank lookup completed with I/O failure");
        } else {
            tracing::info!(rank = result.rank, "rank lookup completed");
        }
    })?;
    let mut poller = RankPoller::new(lookup);

    // Tick loop
    let mut interval = tokio::time::interval(config.tick_interval());
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut tick = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut interrupt => {
                tracing::info!(tick, "interrupted");
                break;
            }
        }
        tick = tick.saturating_add(1);

        simulate(&mut client, &mut poller, tick)?;
        if let Err(err) = client.drain() {
            tracing::warn!(tick, error = %err, "client drain reported an error");
        }

        if let Some(server) = server.as_mut() {
            if tick % 4 == 0 {
                server
                    .transport_mut()
                    .push_event(PlayerJoined::KIND, PlayerJoined { player: tick }.encode());
            }
            if let Err(err) = server.drain() {
                tracing::warn!(tick, error = %err, "game server drain reported an error");
            }
        }

        if config.max_ticks != 0 && tick >= config.max_ticks {
            break;
        }
    }

    // Report
    let mut reports = vec![client.stats().clone()];
    reports.extend(server.as_ref().map(|s| s.stats().clone()));
    tracing::info!(ticks = tick, joins = joins.get(), "host stopping");

    drop(client.shutdown());
    if let Some(server) = server {
        drop(server.shutdown());
    }
    drop(poller);

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}
