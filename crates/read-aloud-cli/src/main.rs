//! read-aloud: attaches read-aloud controls to a page fixture and plays them on a local
//! output device.
//!
//! The page lives in memory. Activations are typed on stdin (`click 3`, `touch-start 3`)
//! and handed to the reader loop exactly like a host's delegated input listener would.

mod cli;

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use read_aloud::{
    AudioProvider, ElementId, InputEvent, MemoryDocument, PageFixture, ReadAloud, ReaderHandle,
    ReaderOptions,
};
use read_aloud_audio::{DeviceAudioProvider, DeviceConfig};
use read_aloud_types::ActivationInfo;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use cli::{Line, Target};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,read_aloud=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    if args.list_devices {
        let host = cpal::default_host();
        for (i, name) in read_aloud_audio::device::list_devices(&host)?.iter().enumerate() {
            println!("#{i}: {name}");
        }
        return Ok(());
    }

    let page_path = args
        .page
        .clone()
        .ok_or_else(|| anyhow!("--page is required"))?;
    let page = PageFixture::load(&page_path)?;
    let doc = Arc::new(MemoryDocument::from_fixture(&page).context("build page")?);

    let media_root = args.media_root.clone().unwrap_or_else(|| {
        page_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    });
    let provider: Arc<dyn AudioProvider> = Arc::new(DeviceAudioProvider::new(DeviceConfig {
        device: args.device.clone(),
        media_root,
        preferred_rate: args.rate,
    })?);

    let options = load_options(args.config.as_deref())?;
    let reader = ReadAloud::new(doc.clone(), provider, &options).context("initialize reader")?;
    let (handle, join) = ReaderHandle::spawn(reader);

    let (line_tx, mut lines) = mpsc::unbounded_channel();
    let ctrlc_tx = line_tx.clone();
    let _ = ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Line::Quit);
    });
    spawn_stdin_reader(line_tx)?;
    eprintln!("{}", cli::HELP);

    while let Some(line) = lines.recv().await {
        match line {
            Line::Click(t) => activate(&handle, &doc, &t, InputEvent::click),
            Line::TouchStart(t, n) => activate(&handle, &doc, &t, |el| InputEvent::touch_start(el, n)),
            Line::TouchEnd(t, n) => activate(&handle, &doc, &t, |el| InputEvent::touch_end(el, n)),
            Line::Refresh => match load_options(args.config.as_deref()) {
                Ok(options) => handle.refresh(options)?,
                Err(e) => tracing::warn!("refresh skipped: {e:#}"),
            },
            Line::Stop => handle.stop()?,
            Line::Status => {
                let status = handle.status().await?;
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            Line::Show => print!("{}", doc.render()),
            Line::Help => eprintln!("{}", cli::HELP),
            Line::Quit => break,
        }
    }

    handle.shutdown()?;
    join.await.context("reader task")?;
    Ok(())
}

/// Options from `path`, or the defaults. Activation hooks log every state change.
fn load_options(path: Option<&Path>) -> Result<ReaderOptions> {
    let options = match path {
        Some(path) => ReaderOptions::load(path)?,
        None => ReaderOptions::default(),
    };
    Ok(options
        .on_activate(|info: &ActivationInfo| {
            tracing::info!(element = info.element, url = %info.url, "reading aloud");
        })
        .on_deactivate(|info: &ActivationInfo| {
            tracing::info!(element = info.element, url = %info.url, reason = ?info.reason, "stopped reading");
        }))
}

fn activate(
    handle: &ReaderHandle,
    doc: &MemoryDocument,
    target: &Target,
    event: impl FnOnce(ElementId) -> InputEvent,
) {
    let el = match target {
        Target::Index(i) => ElementId(*i),
        Target::Id(id) => match doc.element_by_id(id) {
            Some(el) => el,
            None => {
                tracing::warn!(id = %id, "no element with that id");
                return;
            }
        },
    };
    if doc.tag(el).is_none() {
        tracing::warn!(element = %el, "no such element");
        return;
    }
    if let Err(e) = handle.activate(event(el)) {
        tracing::warn!("activation dropped: {e}");
    }
}

/// Forward stdin lines to the command loop. EOF behaves like `quit`.
fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Line>) -> Result<()> {
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for raw in stdin.lock().lines() {
                let raw = match raw {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("stdin read error: {e}");
                        break;
                    }
                };
                match Line::parse(&raw) {
                    Ok(Some(line)) => {
                        if tx.send(line).is_err() {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{e:#}"),
                }
            }
            let _ = tx.send(Line::Quit);
        })
        .context("spawn stdin reader")?;
    Ok(())
}
