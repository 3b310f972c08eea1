use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use tokio::fs;
use tracing::{info, warn};

use page_dom::Document;
use relay_bridge::{OnlineFlag, SharedStore};
use scan_orchestrator::{NoChanges, PageSession, SessionPorts};
use sentinel_core_types::{HighlightStyle, Notification};
use sentinel_event_bus::{drain, InMemoryBus, NotificationBus};
use sentinel_policy_center::{ScanSettings, SentinelPolicy, HIGHLIGHT_STYLE_KEY, SENSITIVITY_KEY};

use super::context::CliContext;
use super::runtime::{build_relay, open_store};

#[derive(Args, Clone, Debug)]
pub struct ScanArgs {
    /// HTML page to scan
    #[arg(long, value_name = "FILE")]
    pub page: PathBuf,

    /// URL the page was served from; its host prefixes every signature
    #[arg(long)]
    pub url: String,

    /// Classifier base URL
    #[arg(long)]
    pub relay: Option<String>,

    /// API key sent with every classifier request
    #[arg(long)]
    pub api_key: Option<String>,

    /// Flagging threshold in [0, 1]
    #[arg(long)]
    pub sensitivity: Option<f64>,

    /// Annotation style: highlight, blur or redact
    #[arg(long)]
    pub style: Option<String>,

    /// Write the annotated page here
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Directory of the persisted settings and feedback queue
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

pub async fn cmd_scan(args: ScanArgs, ctx: &CliContext) -> Result<()> {
    let policy = ctx.policy();
    let markup = fs::read_to_string(&args.page)
        .await
        .with_context(|| format!("Failed to read page {}", args.page.display()))?;
    let document = Document::from_html(&args.url, &markup).context("Failed to parse page")?;

    let store = open_store(args.data_dir.clone())?;
    let settings = resolve_settings(policy, &store, &args).await?;
    info!(
        threshold = settings.threshold,
        style = %settings.style,
        "Scanning {}",
        args.page.display()
    );

    let relay = build_relay(policy, args.relay.clone(), args.api_key.clone())?;
    let bus = InMemoryBus::new(256) as NotificationBus;
    let mut events = bus.subscribe();
    let session = PageSession::new(
        policy,
        settings,
        document,
        SessionPorts {
            classifier: relay.clone(),
            feedback_relay: relay,
            store: Some(store),
            connectivity: OnlineFlag::new(true),
            bus: bus.clone(),
        },
    )?;

    let outcome = session.start(NoChanges).await;
    for notification in drain(&mut events) {
        if let Notification::ScanError { message } = &notification {
            warn!("Scan error: {}", message);
        }
    }
    let summary = match outcome {
        Ok(summary) => summary,
        Err(err) => {
            session.shutdown();
            bail!("Scan aborted: {err}");
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(out) = &args.out {
        let html = session.document().lock().to_html_document();
        fs::write(out, html)
            .await
            .with_context(|| format!("Failed to write {}", out.display()))?;
        info!("Annotated page written to {}", out.display());
    }
    session.shutdown();
    Ok(())
}

/// Policy defaults, then persisted user settings, then command-line flags.
async fn resolve_settings(
    policy: &SentinelPolicy,
    store: &SharedStore,
    args: &ScanArgs,
) -> Result<ScanSettings> {
    let sensitivity = read_setting(store, SENSITIVITY_KEY).await;
    let style = read_setting(store, HIGHLIGHT_STYLE_KEY).await;
    let mut settings =
        ScanSettings::from_persisted(&policy.scan, sensitivity.as_ref(), style.as_ref());

    if let Some(threshold) = args.sensitivity {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            bail!("--sensitivity must be within [0, 1], got {threshold}");
        }
        settings.threshold = threshold;
    }
    if let Some(style) = &args.style {
        settings.style = style.parse::<HighlightStyle>()?;
    }
    Ok(settings)
}

async fn read_setting(store: &SharedStore, key: &str) -> Option<serde_json::Value> {
    match store.read(key).await {
        Ok(value) => value,
        Err(err) => {
            warn!("Ignoring persisted setting {}: {}", key, err);
            None
        }
    }
}
