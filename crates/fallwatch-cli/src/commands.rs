//! Command implementations: system assembly and wiring.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use fallwatch_fusion::prelude::*;
use fallwatch_fusion::RemoteTransport;

use crate::{ChannelArgs, EventsArgs, RunArgs};

/// Assembles and runs the detection system until Ctrl-C.
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut builder = FusionConfig::builder()
        .cooldown(Duration::from_secs(args.cooldown_secs))
        .frames_to_confirm_motion(args.fall_frames)
        .frames_to_confirm_lying(args.lying_frames);
    if args.evict_idle_secs > 0 {
        builder = builder.entity_idle_eviction(Duration::from_secs(args.evict_idle_secs));
    }
    let config = builder.build();

    let store: Arc<dyn EventStore> = Arc::new(
        SqliteEventStore::open(&args.database)
            .with_context(|| format!("opening event database {}", args.database))?,
    );
    let channels = build_channels(&args.channels)?;
    if channels.is_empty() {
        tracing::warn!("no notification channels enabled; alerts will only be stored");
    }

    let dispatcher = Arc::new(AlertDispatcher::new(
        config.dispatcher.clone(),
        store,
        channels,
    ));
    let correlator = Arc::new(Correlator::new(config.correlator(), dispatcher.clone()));
    let runtime = FusionRuntime::new(config.runtime.clone(), correlator, dispatcher);

    let vision = match &args.replay {
        Some(path) => {
            let replay = Arc::new(
                ReplaySource::from_path(path, args.replay_loop)
                    .with_context(|| format!("loading replay script {path}"))?,
            );
            tracing::info!(frames = replay.len(), script = %path, "replay source loaded");
            Some(VisionBundle {
                source: replay.clone(),
                detector: replay.clone(),
                estimator: replay,
            })
        }
        None => {
            tracing::info!("no camera source configured; running remote-only");
            None
        }
    };

    let transport: Option<Box<dyn RemoteTransport>> = if args.udp_port > 0 {
        let receiver = ReportReceiver::spawn(ReceiverConfig {
            bind_address: args.udp_bind.clone(),
            port: args.udp_port,
            ..ReceiverConfig::default()
        })
        .await
        .context("binding the UDP report receiver")?;
        Some(Box::new(receiver))
    } else {
        tracing::info!("UDP report receiver disabled");
        None
    };

    if vision.is_none() && transport.is_none() {
        bail!("nothing to do: no replay script and the report receiver is disabled");
    }

    let handle = runtime.start(vision, transport);
    tracing::info!("system running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

/// Lists recently stored fall events.
pub fn events(args: EventsArgs) -> anyhow::Result<()> {
    let store = SqliteEventStore::open(&args.database)
        .with_context(|| format!("opening event database {}", args.database))?;
    let events = store.recent(args.limit)?;

    if events.is_empty() {
        println!("no fall events recorded");
        return Ok(());
    }

    for stored in events {
        let location = match stored.event.location {
            Some(point) => format!("{:.5}, {:.5}", point.y(), point.x()),
            None => "-".into(),
        };
        println!(
            "{:>6}  {}  {:<6}  {:<20}  {:<10}  {}",
            stored.id,
            stored.event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            stored.event.source,
            stored.event.entity_id,
            stored.status,
            location,
        );
    }
    Ok(())
}

/// Sends a test notification through each enabled channel.
pub async fn test_channels(args: ChannelArgs) -> anyhow::Result<()> {
    let channels = build_channels(&args)?;
    if channels.is_empty() {
        bail!("no channels enabled; pass --enable-chat and/or --enable-telephony");
    }

    let mut failures = 0usize;
    for channel in channels {
        let outcome = channel
            .send_text("FallWatch channel test: this is not an alert.")
            .await;
        match outcome {
            SendOutcome::Delivered => println!("{}: ok", channel.name()),
            SendOutcome::Retryable(reason) | SendOutcome::Terminal(reason) => {
                failures += 1;
                println!("{}: FAILED ({reason})", channel.name());
            }
        }
    }
    if failures > 0 {
        bail!("{failures} channel(s) failed the test send");
    }
    Ok(())
}

fn build_channels(args: &ChannelArgs) -> anyhow::Result<Vec<Arc<dyn NotificationChannel>>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

    if args.enable_chat {
        let bot_token = require_env("FALLWATCH_BOT_TOKEN")?;
        let chat_id = require_env("FALLWATCH_CHAT_ID")?;
        let channel =
            ChatChannel::new(ChatConfig::new(bot_token, chat_id)).context("chat channel")?;
        channels.push(Arc::new(channel));
    }

    if args.enable_telephony {
        if args.extensions.is_empty() {
            bail!("telephony enabled but no --extension given");
        }
        let config = TelephonyConfig {
            host: args.ami_host.clone(),
            port: args.ami_port,
            username: require_env("FALLWATCH_AMI_USERNAME")?,
            secret: require_env("FALLWATCH_AMI_SECRET")?,
            extensions: args.extensions.clone(),
            ..TelephonyConfig::default()
        };
        channels.push(Arc::new(TelephonyChannel::new(config)));
    }

    Ok(channels)
}

fn require_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("environment variable {name} is not set"))
}
