use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Parallel HLS VOD downloader",
    long_about = "Downloads every segment of an HLS playlist with a pool of workers.\n\
                  \n\
                  Segments already on disk are skipped, so re-running the same URL\n\
                  resumes an interrupted download. AES-128 encrypted streams are\n\
                  decrypted when merging with --convert."
)]
pub struct CliArgs {
    /// Playlist URL(s) to download
    #[arg(required = true, help = "One or more .m3u8 playlist URLs, downloaded one after another")]
    pub urls: Vec<String>,

    /// Output directory
    #[arg(
        short,
        long,
        default_value = "downloads",
        help = "Directory under which one save directory per playlist URL is created"
    )]
    pub output_dir: PathBuf,

    /// Number of concurrent segment downloads
    #[arg(short = 'c', long, default_value = "3", help = "Number of segment download workers")]
    pub concurrency: usize,

    /// Merge segments into one file
    #[arg(
        long,
        help = "Decrypt and merge all segments into <save_dir>.<ext> instead of writing a local playlist"
    )]
    pub convert: bool,

    /// Extension of the merged file
    #[arg(long, default_value = "mp4", help = "Extension of the merged file in --convert mode")]
    pub extension: String,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// Read timeout in seconds
    #[arg(
        long,
        default_value = "1800",
        help = "Read timeout in seconds (maximum time between receiving data chunks)"
    )]
    pub read_timeout: u64,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    #[arg(long, help = "Referer sent with every request, for CDNs that check the embedding page")]
    pub referer: Option<String>,

    #[arg(long, help = "Cookie header sent with every request")]
    pub cookie: Option<String>,

    /// Proxy URL (e.g., "http://proxy.example.com:8080")
    #[arg(
        long,
        help = "Proxy server URL for downloads (e.g., \"http://proxy.example.com:8080\")"
    )]
    pub proxy: Option<String>,

    /// Proxy type (http, https, socks5, all)
    #[arg(
        long,
        default_value = "http",
        help = "Proxy type (http, https, socks5, all)",
        value_parser = ["http", "https", "socks5", "all"]
    )]
    pub proxy_type: String,

    /// Proxy username
    #[arg(long, help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    /// Proxy password
    #[arg(long, help = "Password for proxy authentication")]
    pub proxy_pass: Option<String>,

    /// Disable all proxy settings for downloads
    #[arg(
        long,
        help = "Disable all proxy settings (including system proxy) for downloads"
    )]
    pub no_proxy: bool,

    /// Segment file name obfuscation key
    #[arg(
        long,
        help = "Hash segment file names with this key so they cannot be matched to their URLs"
    )]
    pub name_key: Option<String>,

    /// Show a progress bar
    #[arg(
        short = 'P',
        long = "progress",
        default_value = "false",
        help = "Show a progress bar per download"
    )]
    pub show_progress: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}
