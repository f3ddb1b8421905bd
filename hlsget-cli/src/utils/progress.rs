use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use hlsget_engine::hls::DownloadEvent;

use crate::utils::format_bytes;

fn segments_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} segments")
        .unwrap()
        .progress_chars("=> ")
}

/// Renders the events of one download as a segment-count progress bar
pub struct ProgressReporter {
    bar: Option<ProgressBar>,
    label: String,
}

impl ProgressReporter {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let bar = ProgressBar::new(0);
        bar.set_style(segments_style());
        bar.set_message(format!("Fetching {label}"));
        bar.enable_steady_tick(Duration::from_millis(500));
        Self {
            bar: Some(bar),
            label,
        }
    }

    pub fn new_disabled(label: impl Into<String>) -> Self {
        Self {
            bar: None,
            label: label.into(),
        }
    }

    pub fn handle_event(&self, event: &DownloadEvent) {
        let Some(bar) = &self.bar else {
            return;
        };

        match event {
            DownloadEvent::Start => {}
            DownloadEvent::StartDownload { total_segments, .. } => {
                bar.set_length(*total_segments as u64);
                bar.set_message(format!("Downloading {}", self.label));
            }
            DownloadEvent::Downloading {
                total_bytes,
                total_segments,
                processed_segments,
                ..
            } => {
                bar.set_length(*total_segments as u64);
                // The processed counter is one-based
                bar.set_position(processed_segments.saturating_sub(1));
                bar.set_message(format!(
                    "Downloading {} ({})",
                    self.label,
                    format_bytes(*total_bytes)
                ));
            }
            DownloadEvent::Progress { .. } => {}
            DownloadEvent::Converting => bar.set_message(format!("Merging {}", self.label)),
            DownloadEvent::Success(_) => bar.finish_with_message(format!("Finished {}", self.label)),
            DownloadEvent::Error(e) => bar.abandon_with_message(format!("Failed {}: {e}", self.label)),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}
