use std::time::Duration;

use clap::Parser;
use error::AppError;
use hlsget_engine::hls::{ChannelListener, DownloadEvent, DownloadTask, HlsConfig, OutputMode};
use hlsget_engine::{DownloaderConfig, ProxyAuth, ProxyConfig, ProxyType};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod cli;
mod error;
mod utils;

use cli::CliArgs;
use utils::progress::ProgressReporter;
use utils::{format_bytes, parse_headers};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("hlsget.log")?;

    let multi_writer = MakeWriterExt::and(std::io::stdout, log_file);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!("hlsget - parallel HLS VOD downloader");
    info!(
        "HTTP timeout configuration: connect={}s, read={}s",
        args.connect_timeout, args.read_timeout
    );

    let proxy_config = if args.no_proxy {
        info!("All proxy settings disabled (--no-proxy flag)");
        None
    } else if let Some(proxy_url) = args.proxy.as_ref() {
        let proxy_type: ProxyType = args
            .proxy_type
            .parse()
            .map_err(|_| AppError::InvalidInput(format!("Invalid proxy type: '{}'", args.proxy_type)))?;

        let auth = if let (Some(username), Some(password)) = (&args.proxy_user, &args.proxy_pass) {
            Some(ProxyAuth {
                username: username.clone(),
                password: password.clone(),
            })
        } else {
            None
        };

        info!(
            proxy_url = %proxy_url,
            proxy_type = ?proxy_type,
            has_auth = auth.is_some(),
            "Using explicit proxy configuration for downloads"
        );

        Some(ProxyConfig {
            url: proxy_url.clone(),
            proxy_type,
            auth,
        })
    } else {
        None
    };

    let download_config = {
        let mut builder = DownloaderConfig::builder()
            .with_connect_timeout(Duration::from_secs(args.connect_timeout))
            .with_read_timeout(Duration::from_secs(args.read_timeout));

        if let Some(referer) = &args.referer {
            builder = builder.with_referer(referer);
        }
        if let Some(cookie) = &args.cookie {
            builder = builder.with_cookie(cookie);
        }
        for (name, value) in parse_headers(&args.headers) {
            builder = builder.with_header(name, value);
        }

        if let Some(proxy) = proxy_config {
            builder = builder.with_proxy(proxy);
        } else {
            builder = builder.with_system_proxy(!args.no_proxy);
        }
        builder.build()
    };

    if args.concurrency == 0 {
        return Err(AppError::InvalidInput(
            "Concurrency must be at least 1".to_string(),
        ));
    }

    let hls_config = HlsConfig {
        base: download_config,
        download_concurrency: args.concurrency,
        output_mode: if args.convert {
            OutputMode::Convert
        } else {
            OutputMode::Playlist
        },
        output_extension: args.extension.clone(),
        save_root: args.output_dir.clone(),
        ..Default::default()
    };

    let task = DownloadTask::builder().with_config(hls_config).build()?;

    for url in &args.urls {
        let reporter = if args.show_progress {
            ProgressReporter::new(url.clone())
        } else {
            ProgressReporter::new_disabled(url.clone())
        };
        let outcome = download_one(&task, url, args.name_key.as_deref(), &reporter).await;
        reporter.finish();
        outcome?;
    }

    Ok(())
}

async fn download_one(
    task: &DownloadTask,
    url: &str,
    name_key: Option<&str>,
    reporter: &ProgressReporter,
) -> Result<(), AppError> {
    info!(url = %url, dir = %task.save_dir(url).display(), "Starting download");

    // Listener must stay alive for the whole session, the task only holds it weakly
    let (listener, mut events) = ChannelListener::new();
    task.download_url(url, name_key, &listener)?;

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping download");
                task.stop();
                return Err(AppError::Interrupted);
            }
        };

        let Some(event) = event else {
            return Err(AppError::Initialization(
                "Event channel closed before the download finished".to_string(),
            ));
        };
        reporter.handle_event(&event);

        match event {
            DownloadEvent::Success(playlist) => {
                let bytes: u64 = playlist.segments.iter().map(|s| s.file_size).sum();
                match &playlist.artifact_path {
                    Some(path) => info!(url = %url, output = %path.display(), size = %format_bytes(bytes), "Download complete"),
                    None => warn!(url = %url, "No segment data was written, nothing to merge"),
                }
                return Ok(());
            }
            DownloadEvent::Error(e) => {
                error!(url = %url, error = %e, "Download failed");
                return Err(e.into());
            }
            DownloadEvent::Converting => info!(url = %url, "Merging segments"),
            _ => {}
        }
    }
}
