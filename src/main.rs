//! CLI noticelink
//!
//! Слушает живую ленту уведомлений через шину и прогоняет push-события
//! через ретранслятор, печатая сигналы, которые получили бы страницы.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use noticelink::{
    bus::BusClient,
    config::Settings,
    logging::init_logging,
    notice::{NoticeFeed, PageEvent},
    relay::{NotificationData, NotificationRelay, PageRegistry, TracingNotifier},
};
use tokio::sync::mpsc;
use tracing::{info, warn};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

#[derive(Parser)]
#[command(name = "noticelink")]
#[command(version = VERSION)]
#[command(about = "Realtime notice feed and push relay", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Файл настроек (по умолчанию `noticelink.toml`, если он есть)
    #[arg(short, long, env = "NOTICELINK_CONFIG")]
    config: Option<PathBuf>,
    /// Переопределяет `bus.base_url`
    #[arg(long, env = "NOTICELINK_BASE_URL")]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Подключиться к шине и печатать уведомления до Ctrl-C
    Listen {
        /// Подписать также пользовательский топик
        #[arg(long)]
        user_id: Option<u64>,
    },
    /// Прогнать push-событие через ретранслятор
    Push {
        /// JSON-полезная нагрузка; без неё используется пустое событие
        payload: Option<String>,
        /// Обработать как push при открытой странице
        #[arg(long)]
        foreground: bool,
        /// Для `--foreground`: страница скрыта
        #[arg(long, requires = "foreground")]
        hidden: bool,
        /// Сколько открытых страниц смоделировать
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Смоделировать клик по уведомлению
    Click {
        #[arg(long, default_value = "")]
        url: String,
        #[arg(long)]
        thread_id: Option<String>,
        /// Сколько открытых страниц смоделировать
        #[arg(long, default_value_t = 0)]
        pages: usize,
    },
    /// Показать итоговые настройки
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(base_url) = cli.base_url {
        settings.bus.base_url = base_url;
        settings.validate().context("Invalid --base-url")?;
    }

    if let Commands::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    let logging = init_logging(settings.logging.clone()).context("Failed to init logging")?;
    info!(version = VERSION, "noticelink starting");

    let result = match cli.command {
        Commands::Listen { user_id } => listen(&settings, user_id).await,
        Commands::Push {
            payload,
            foreground,
            hidden,
            pages,
        } => push(&settings, payload, foreground, hidden, pages).await,
        Commands::Click {
            url,
            thread_id,
            pages,
        } => click(&settings, url, thread_id, pages).await,
        Commands::Config => Ok(()),
    };

    logging.shutdown();
    result
}

async fn listen(
    settings: &Settings,
    user_id: Option<u64>,
) -> Result<()> {
    let client = BusClient::websocket(settings.bus_config());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut feed = NoticeFeed::new(client.clone(), tx);
    feed.start_live(user_id).await;
    info!(state = %client.state(), "Listening for notices, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
        }
    }

    let unread = feed.board().lock().unread();
    feed.stop_live();
    client.shutdown().await;
    info!(unread, "Listener stopped");
    Ok(())
}

async fn push(
    settings: &Settings,
    payload: Option<String>,
    foreground: bool,
    hidden: bool,
    pages: usize,
) -> Result<()> {
    let relay =
        NotificationRelay::new(settings.relay_options(), TracingNotifier, PageRegistry::new());
    let mut handles: Vec<_> = (0..pages).map(|_| relay.pages().open_page(Some("/"))).collect();
    let raw = payload.map(String::into_bytes);

    if foreground {
        let shown = relay.on_foreground_push(raw.as_deref(), hidden).await;
        info!(shown, "Foreground push handled");
    } else {
        let request = relay.on_push_received(raw.as_deref()).await;
        println!("{}", serde_json::to_string_pretty(&request)?);
    }

    for handle in &mut handles {
        while let Some(event) = handle.try_recv() {
            print_event(&event);
        }
    }
    Ok(())
}

async fn click(
    settings: &Settings,
    url: String,
    thread_id: Option<String>,
    pages: usize,
) -> Result<()> {
    let relay =
        NotificationRelay::new(settings.relay_options(), TracingNotifier, PageRegistry::new());
    let mut opened = relay
        .pages()
        .take_opened()
        .context("Window host already taken")?;
    let mut handles: Vec<_> = (0..pages).map(|_| relay.pages().open_page(Some("/"))).collect();

    let data = NotificationData {
        url,
        thread_id,
        kind: String::new(),
    };
    let outcome = relay.on_notification_clicked(&data).await;
    info!(?outcome, "Click handled");

    for handle in &mut handles {
        while let Some(event) = handle.try_recv() {
            print_event(&event);
        }
    }
    if let Ok(page) = opened.try_recv() {
        println!("opened {}", page.url().unwrap_or("/"));
    }
    Ok(())
}

fn print_event(event: &PageEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "Failed to serialize page event"),
    }
}
