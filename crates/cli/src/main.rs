//! Replays a recorded trace of page events through the content cache.
//!
//! A trace is JSON lines, one event per line:
//!
//! ```text
//! {"event":"init","url":"https://a.test/","title":"A","text":"..."}
//! {"event":"mutation","text":"...","records":[{"type":"character_data","parent_tag":"p"}]}
//! {"event":"wait","ms":400}
//! {"event":"navigate","url":"https://a.test/b","title":"B","text":"...","advance_ms":3000}
//! {"event":"get_content","force":false}
//! ```
//!
//! `advance_ms` moves the cache clock before the event runs. `wait` lets
//! debounce timers fire. Results go to stdout as JSON, logs to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use tabcache_client::{
    ContentService, HistoryEventObserver, HistoryEventSender, MemoryPage, MutationRecord, PollingObserver,
    ScrapeScheduler, SchedulerConfig, telemetry,
};
use tabcache_core::cache::Codec;
use tabcache_core::{AppConfig, ManualClock, SnapshotStore, TabId};

#[derive(Parser)]
#[command(name = "tabcache-replay")]
#[command(about = "Replay a page event trace through the tab content cache", long_about = None)]
struct Cli {
    /// JSON-lines trace file, `-` for stdin
    trace: PathBuf,

    /// Tab id the trace is replayed into
    #[arg(long, default_value_t = 1)]
    tab: TabId,

    /// Emit logs as JSON
    #[arg(long, env = "TABCACHE_LOG_JSON")]
    json_logs: bool,

    /// Also watch the page URL by polling
    #[arg(long)]
    poll: bool,
}

#[derive(Debug, Deserialize)]
struct TraceLine {
    #[serde(default)]
    advance_ms: u64,
    #[serde(flatten)]
    event: TraceEvent,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum HistoryCall {
    #[default]
    Push,
    Replace,
    Pop,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum TraceEvent {
    Init {
        url: String,
        #[serde(default)]
        title: String,
        text: String,
    },
    Mutation {
        text: Option<String>,
        records: Vec<MutationRecord>,
    },
    Navigate {
        url: String,
        #[serde(default)]
        title: String,
        text: String,
        #[serde(default)]
        via: HistoryCall,
    },
    Manual {
        text: Option<String>,
    },
    Fail {
        reason: String,
    },
    Recover,
    GetContent {
        #[serde(default)]
        force: bool,
    },
    Summary,
    Clear,
    Wait {
        ms: u64,
    },
}

struct Replay {
    tab: TabId,
    clock: ManualClock,
    service: ContentService,
    page: Arc<MemoryPage>,
    scheduler: ScrapeScheduler,
    history: HistoryEventSender,
}

impl Replay {
    fn new(config: &AppConfig, tab: TabId) -> Self {
        let clock = ManualClock::default();
        let store = SnapshotStore::with_parts(
            config.store_config(),
            Codec::with_mode(config.compression),
            Arc::new(clock.clone()),
        );
        let service = ContentService::new(Arc::new(store), SchedulerConfig::from(config))
            .with_freshness(config.current_max_age(), config.summary_max_age());

        let page = Arc::new(MemoryPage::new("about:blank", "", ""));
        let scheduler = service.attach_page(tab, page.clone());
        let (history, observer) = HistoryEventObserver::channel("about:blank");
        scheduler.watch_navigation(observer);

        Self { tab, clock, service, page, scheduler, history }
    }

    async fn apply(&self, line: TraceLine) -> Result<Option<serde_json::Value>> {
        if line.advance_ms > 0 {
            self.clock.advance(chrono::Duration::milliseconds(line.advance_ms as i64));
        }

        match line.event {
            TraceEvent::Init { url, title, text } => {
                self.page.navigate(url, title, text);
                let outcome = self.scheduler.init().await?;
                Ok(Some(json!({ "event": "init", "outcome": outcome.label() })))
            }
            TraceEvent::Mutation { text, records } => {
                if let Some(text) = text {
                    self.page.set_text(text);
                }
                let scheduled = self.scheduler.on_mutations(&records);
                Ok(Some(json!({ "event": "mutation", "scheduled": scheduled })))
            }
            TraceEvent::Navigate { url, title, text, via } => {
                self.page.navigate(url.as_str(), title, text);
                let delivered = match via {
                    HistoryCall::Push => self.history.push_state(&url),
                    HistoryCall::Replace => self.history.replace_state(&url),
                    HistoryCall::Pop => self.history.pop_state(&url),
                };
                Ok(Some(json!({ "event": "navigate", "delivered": delivered })))
            }
            TraceEvent::Manual { text } => {
                if let Some(text) = text {
                    self.page.set_text(text);
                }
                self.service.trigger_manual_scrape(self.tab)?;
                Ok(None)
            }
            TraceEvent::Fail { reason } => {
                self.page.fail_with(tabcache_client::ExtractError::Failed(reason));
                Ok(None)
            }
            TraceEvent::Recover => {
                self.page.recover();
                Ok(None)
            }
            TraceEvent::GetContent { force } => {
                let content = self.service.get_current_content(self.tab, force).await;
                Ok(Some(self.content_report("get_content", content)))
            }
            TraceEvent::Summary => {
                let content = self.service.get_content_for_summary(self.tab).await;
                Ok(Some(self.content_report("summary", content)))
            }
            TraceEvent::Clear => {
                self.service.clear_tab(self.tab);
                Ok(None)
            }
            TraceEvent::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(None)
            }
        }
    }

    fn content_report(&self, event: &str, content: Result<String, tabcache_core::Error>) -> serde_json::Value {
        let latest = self.service.store().get_latest_snapshot(self.tab);
        match content {
            Ok(content) => json!({
                "event": event,
                "chars": content.chars().count(),
                "version": latest.as_ref().map(|s| s.version),
                "hash": latest.as_ref().map(|s| s.content_hash.to_string()),
            }),
            Err(e) => json!({ "event": event, "error": e.code(), "detail": e.to_string() }),
        }
    }
}

async fn replay<R: AsyncBufRead + Unpin>(reader: R, replay: &Replay) -> Result<usize> {
    let mut lines = reader.lines();
    let mut count = 0;
    let mut number = 0;

    while let Some(raw) = lines.next_line().await? {
        number += 1;
        if raw.trim().is_empty() {
            continue;
        }
        let line: TraceLine = serde_json::from_str(&raw).with_context(|| format!("trace line {number}"))?;
        tracing::debug!(line = number, event = ?line.event, "replaying");
        if let Some(report) = replay.apply(line).await.with_context(|| format!("trace line {number}"))? {
            println!("{report}");
        }
        count += 1;
    }
    Ok(count)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.json_logs).map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))?;

    let config = AppConfig::load()?;
    let session = Replay::new(&config, cli.tab);
    if cli.poll {
        session
            .scheduler
            .watch_navigation(PollingObserver::new(session.page.clone(), config.navigation_poll_interval()));
    }
    let cleanup = session.service.spawn_cleanup(config.cleanup_interval());

    let events = if cli.trace.as_os_str() == "-" {
        replay(BufReader::new(tokio::io::stdin()), &session).await?
    } else {
        let file = tokio::fs::File::open(&cli.trace)
            .await
            .with_context(|| format!("opening {}", cli.trace.display()))?;
        replay(BufReader::new(file), &session).await?
    };

    session.scheduler.cancel_pending();
    cleanup.abort();

    tracing::info!(events, "trace replayed");
    println!("{}", serde_json::to_string(&session.service.get_stats())?);
    Ok(())
}
