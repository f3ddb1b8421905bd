mod common;

use std::time::Duration;

use aes::Aes128;
use axum::http::StatusCode;
use cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use common::{Fixture, media_playlist, until_terminal};
use hlsget_engine::hls::{
    ChannelListener, DownloadEvent, DownloadTask, HashedSegmentNamer, HlsDownloaderError,
    OutputMode, Playlist, Segment, SegmentNamer, TaskState,
};
use url::Url;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

fn task(root: &std::path::Path, mode: OutputMode) -> DownloadTask {
    DownloadTask::builder()
        .with_save_root(root)
        .with_output_mode(mode)
        .with_concurrency(3)
        .with_progress_interval(Duration::from_millis(50))
        .build()
        .unwrap()
}

fn vod_playlist(base: &Url, names: &[&str], dir: &std::path::Path) -> Playlist {
    let segments = names
        .iter()
        .enumerate()
        .map(|(i, name)| Segment::new(*name, i as u64, 4.0))
        .collect();
    let mut playlist = Playlist::new(base.join("vod/").unwrap(), segments);
    playlist.dir_path = Some(dir.to_path_buf());
    playlist
}

fn success(events: &[DownloadEvent]) -> &Playlist {
    match events.last() {
        Some(DownloadEvent::Success(playlist)) => playlist,
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_playlist_mode_lists_segments_in_playlist_order() {
    let fixture = Fixture::new();
    // First segment finishes last
    fixture.serve_slow("vod/s0.ts", "zero", Duration::from_millis(300));
    fixture.serve("vod/s1.ts", "one");
    fixture.serve("vod/s2.ts", "two");
    fixture.serve("vod/s3.ts", "three");
    let base = fixture.start().await;

    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("vod");
    let task = task(root.path(), OutputMode::Playlist);
    let names = ["s0.ts", "s1.ts", "s2.ts", "s3.ts"];
    let playlist = vod_playlist(&base, &names, &dir);

    let (listener, mut rx) = ChannelListener::new();
    task.download(playlist.clone(), None, &listener).unwrap();
    let events = until_terminal(&mut rx).await;
    let done = success(&events);

    let text = std::fs::read_to_string(dir.join("local.m3u8")).unwrap();
    let listed: Vec<&str> = text
        .lines()
        .filter(|l| !l.starts_with('#') && !l.is_empty())
        .collect();
    let expected: Vec<String> = playlist
        .segments
        .iter()
        .map(|s| HashedSegmentNamer.file_name(None, s).unwrap())
        .collect();
    assert_eq!(listed, expected);

    assert_eq!(std::fs::read(dir.join(&expected[0])).unwrap(), b"zero");
    assert_eq!(std::fs::read(dir.join(&expected[3])).unwrap(), b"three");

    let sizes: Vec<u64> = done.segments.iter().map(|s| s.file_size).collect();
    assert_eq!(sizes, vec![4, 3, 3, 5]);
    assert_eq!(done.dir_path.as_deref(), Some(dir.as_path()));
    assert_eq!(
        done.artifact_path.as_deref(),
        Some(dir.join("local.m3u8").as_path())
    );

    let start_downloads = events
        .iter()
        .filter(|e| matches!(e, DownloadEvent::StartDownload { .. }))
        .count();
    assert_eq!(start_downloads, 1);
    assert!(!task.is_running());
    assert_eq!(task.state(), TaskState::Succeeded);
}

#[tokio::test]
async fn test_resume_performs_no_fetches_when_all_segments_exist() {
    let fixture = Fixture::new();
    fixture.serve("vod/a.ts", "aaaa");
    fixture.serve("vod/b.ts", "bb");
    let base = fixture.start().await;

    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("vod");
    let task = task(root.path(), OutputMode::Playlist);
    let playlist = vod_playlist(&base, &["a.ts", "b.ts"], &dir);

    let (listener, mut rx) = ChannelListener::new();
    task.download(playlist.clone(), None, &listener).unwrap();
    success(&until_terminal(&mut rx).await);
    assert_eq!(fixture.total_hits(), 2);

    let (listener, mut rx) = ChannelListener::new();
    task.download(playlist, None, &listener).unwrap();
    let events = until_terminal(&mut rx).await;
    let done = success(&events);

    assert_eq!(fixture.total_hits(), 2);
    assert_eq!(done.segments[0].file_size, 4);
    assert_eq!(done.segments[1].file_size, 2);
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, DownloadEvent::StartDownload { .. }))
    );
}

#[tokio::test]
async fn test_segment_error_aborts_without_artifact() {
    let fixture = Fixture::new();
    fixture.serve_slow("vod/ok0.ts", "slow", Duration::from_secs(5));
    fixture.serve_status("vod/bad.ts", StatusCode::NOT_FOUND);
    fixture.serve_slow("vod/ok1.ts", "slow", Duration::from_secs(5));
    let base = fixture.start().await;

    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("vod");
    let task = task(root.path(), OutputMode::Convert);
    let playlist = vod_playlist(&base, &["ok0.ts", "bad.ts", "ok1.ts"], &dir);

    let (listener, mut rx) = ChannelListener::new();
    task.download(playlist, None, &listener).unwrap();

    // Fail-fast: the error must not wait for the slow segments
    let events = tokio::time::timeout(Duration::from_secs(3), until_terminal(&mut rx))
        .await
        .expect("error was not reported promptly");
    match events.last() {
        Some(DownloadEvent::Error(HlsDownloaderError::SegmentStatus { status, .. })) => {
            assert_eq!(*status, reqwest::StatusCode::NOT_FOUND)
        }
        other => panic!("expected segment status error, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(task.state(), TaskState::Aborted);
    assert!(!root.path().join("vod.mp4").exists());
    while let Ok(event) = rx.try_recv() {
        assert!(!event.is_terminal(), "second terminal event {event:?}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_download_can_be_retried_as_soon_as_error_arrives() {
    let fixture = Fixture::new();
    fixture.serve("vod/a.ts", "aaaa");
    fixture.serve_status("vod/gone.ts", StatusCode::NOT_FOUND);
    fixture.serve("vod/b.ts", "bbbb");
    fixture.serve("vod/retry.ts", "retry");
    let base = fixture.start().await;

    let root = tempfile::tempdir().unwrap();
    let task = task(root.path(), OutputMode::Playlist);

    for round in 0..10 {
        let broken = vod_playlist(
            &base,
            &["a.ts", "gone.ts", "b.ts"],
            &root.path().join(format!("broken{round}")),
        );
        let (listener, mut rx) = ChannelListener::new();
        task.download(broken, None, &listener).unwrap();
        let events = until_terminal(&mut rx).await;
        assert!(matches!(events.last(), Some(DownloadEvent::Error(_))));

        // The session is released before the error is delivered
        assert!(!task.is_running(), "still running at error in round {round}");
        let retry = vod_playlist(&base, &["retry.ts"], &root.path().join(format!("retry{round}")));
        let (again, mut again_rx) = ChannelListener::new();
        task.download(retry, None, &again).unwrap();
        success(&until_terminal(&mut again_rx).await);
    }
}

#[tokio::test]
async fn test_playlist_mode_keeps_the_key_next_to_segments() {
    let key = [9u8; 16];
    let fixture = Fixture::new();
    fixture.serve("enc/seg0.ts", vec![1u8; 32]);
    fixture.serve("enc/seg1.ts", vec![2u8; 16]);
    fixture.serve("enc/key.bin", key.to_vec());
    fixture.serve(
        "enc/index.m3u8",
        media_playlist(
            &["seg0.ts", "seg1.ts"],
            Some("#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\""),
        ),
    );
    let base = fixture.start().await;
    let url = base.join("enc/index.m3u8").unwrap();

    let root = tempfile::tempdir().unwrap();
    let task = task(root.path(), OutputMode::Playlist);

    let (listener, mut rx) = ChannelListener::new();
    task.download_url(url.as_str(), None, &listener).unwrap();
    let done = success(&until_terminal(&mut rx).await).clone();

    let dir = task.save_dir(url.as_str());
    let local = task.local_playlist_path(url.as_str());
    assert_eq!(done.artifact_path.as_deref(), Some(local.as_path()));
    assert_eq!(std::fs::read(dir.join("key.key")).unwrap(), key);

    let text = std::fs::read_to_string(&local).unwrap();
    assert!(text.contains("METHOD=AES-128"));
    assert!(text.contains("URI=\"key.key\""));
    // Segments stay encrypted on disk in playlist mode
    let sizes: Vec<u64> = done.segments.iter().map(|s| s.file_size).collect();
    assert_eq!(sizes, vec![32, 16]);
}

#[tokio::test]
async fn test_stop_is_silent_and_task_accepts_next_download() {
    let fixture = Fixture::new();
    fixture.serve_slow("vod/slow0.ts", "x", Duration::from_secs(2));
    fixture.serve_slow("vod/slow1.ts", "y", Duration::from_secs(2));
    fixture.serve("vod/fast.ts", "fast");
    let base = fixture.start().await;

    let root = tempfile::tempdir().unwrap();
    let task = task(root.path(), OutputMode::Playlist);
    let slow = vod_playlist(&base, &["slow0.ts", "slow1.ts"], &root.path().join("slow"));

    let (first, mut first_rx) = ChannelListener::new();
    task.download(slow, None, &first).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(task.is_running());

    task.stop();
    task.stop();
    assert!(!task.is_running());

    tokio::time::sleep(Duration::from_millis(2500)).await;
    while let Ok(event) = first_rx.try_recv() {
        assert!(!event.is_terminal(), "stopped session reported {event:?}");
    }

    let fast = vod_playlist(&base, &["fast.ts"], &root.path().join("fast"));
    let (second, mut second_rx) = ChannelListener::new();
    task.download(fast, None, &second).unwrap();
    success(&until_terminal(&mut second_rx).await);
}

#[tokio::test]
async fn test_second_download_while_running_is_rejected() {
    let fixture = Fixture::new();
    fixture.serve_slow("vod/a.ts", "first", Duration::from_millis(400));
    let base = fixture.start().await;

    let root = tempfile::tempdir().unwrap();
    let task = task(root.path(), OutputMode::Playlist);
    let running = vod_playlist(&base, &["a.ts"], &root.path().join("one"));
    let other = vod_playlist(&base, &["a.ts"], &root.path().join("two"));

    let (first, mut first_rx) = ChannelListener::new();
    task.download(running, None, &first).unwrap();

    let (second, mut second_rx) = ChannelListener::new();
    let err = task.download(other, None, &second).unwrap_err();
    assert!(err.is_task_running());
    assert!(matches!(
        until_terminal(&mut second_rx).await.last(),
        Some(DownloadEvent::Error(HlsDownloaderError::TaskRunning))
    ));

    // The running session is untouched
    assert!(task.is_running());
    success(&until_terminal(&mut first_rx).await);
    assert!(!root.path().join("two").exists());
}

#[tokio::test]
async fn test_convert_concatenates_in_playlist_order() {
    let fixture = Fixture::new();
    fixture.serve_slow("vod/p0.ts", "first-", Duration::from_millis(200));
    fixture.serve("vod/p1.ts", "second-");
    fixture.serve("vod/p2.ts", "third");
    let base = fixture.start().await;

    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("movie");
    let task = task(root.path(), OutputMode::Convert);
    let playlist = vod_playlist(&base, &["p0.ts", "p1.ts", "p2.ts"], &dir);

    let (listener, mut rx) = ChannelListener::new();
    task.download(playlist, None, &listener).unwrap();
    let events = until_terminal(&mut rx).await;
    let done = success(&events);

    let artifact = root.path().join("movie.mp4");
    assert_eq!(done.artifact_path.as_deref(), Some(artifact.as_path()));
    assert_eq!(std::fs::read(&artifact).unwrap(), b"first-second-third");
    assert!(!dir.exists());
    assert!(events.iter().any(|e| matches!(e, DownloadEvent::Converting)));
}

#[tokio::test]
async fn test_existing_artifact_short_circuits() {
    let fixture = Fixture::new();
    let base = fixture.start().await;

    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("done");
    std::fs::write(root.path().join("done.mp4"), b"already here").unwrap();
    let task = task(root.path(), OutputMode::Convert);
    let playlist = vod_playlist(&base, &["x.ts", "y.ts"], &dir);

    let (listener, mut rx) = ChannelListener::new();
    task.download(playlist, None, &listener).unwrap();
    let events = until_terminal(&mut rx).await;

    assert_eq!(events.len(), 1);
    let done = success(&events);
    assert_eq!(
        done.artifact_path.as_deref(),
        Some(root.path().join("done.mp4").as_path())
    );
    assert_eq!(fixture.total_hits(), 0);
    assert_eq!(task.state(), TaskState::Succeeded);
}

#[tokio::test]
async fn test_download_url_decrypts_aes128_segments() {
    let key = [7u8; 16];
    let iv_hex = "0x000102030405060708090a0b0c0d0e0f";
    let iv: [u8; 16] = std::array::from_fn(|i| i as u8);
    let plain = [b"alpha segment ".as_slice(), b"beta", b"gamma segment payload"];

    let fixture = Fixture::new();
    for (i, data) in plain.iter().enumerate() {
        let encrypted = Aes128CbcEnc::new_from_slices(&key, &iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(data);
        fixture.serve(&format!("enc/seg{i}.ts"), encrypted);
    }
    fixture.serve("enc/key.bin", key.to_vec());
    let key_line = format!("#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV={iv_hex}");
    fixture.serve(
        "enc/index.m3u8",
        media_playlist(&["seg0.ts", "seg1.ts", "seg2.ts"], Some(key_line.as_str())),
    );
    let base = fixture.start().await;
    let url = base.join("enc/index.m3u8").unwrap();

    let root = tempfile::tempdir().unwrap();
    let task = task(root.path(), OutputMode::Convert);

    let (listener, mut rx) = ChannelListener::new();
    task.download_url(url.as_str(), Some("names"), &listener)
        .unwrap();
    let events = until_terminal(&mut rx).await;
    assert!(matches!(events.first(), Some(DownloadEvent::Start)));
    let done = success(&events);

    let artifact = task.artifact_path(url.as_str());
    assert_eq!(done.artifact_path.as_deref(), Some(artifact.as_path()));
    assert_eq!(
        std::fs::read(&artifact).unwrap(),
        plain.concat()
    );
    assert_eq!(fixture.hits("enc/key.bin"), 1);
}

#[tokio::test]
async fn test_download_url_follows_master_playlist() {
    let fixture = Fixture::new();
    fixture.serve(
        "live/master.m3u8",
        "#EXTM3U\n\
         #EXT-X-STREAM-INF:BANDWIDTH=500000\n\
         low/index.m3u8\n\
         #EXT-X-STREAM-INF:BANDWIDTH=2000000\n\
         high/index.m3u8\n",
    );
    fixture.serve("live/high/index.m3u8", media_playlist(&["h0.ts", "h1.ts"], None));
    fixture.serve("live/high/h0.ts", "H0");
    fixture.serve("live/high/h1.ts", "H1");
    let base = fixture.start().await;
    let url = base.join("live/master.m3u8").unwrap();

    let root = tempfile::tempdir().unwrap();
    let task = task(root.path(), OutputMode::Playlist);

    let (listener, mut rx) = ChannelListener::new();
    task.download_url(url.as_str(), None, &listener).unwrap();
    success(&until_terminal(&mut rx).await);

    let local = task.local_playlist_path(url.as_str());
    let text = std::fs::read_to_string(&local).unwrap();
    assert_eq!(text.matches("#EXTINF").count(), 2);
    assert_eq!(fixture.hits("live/low/index.m3u8"), 0);
    assert_eq!(fixture.hits("live/high/h1.ts"), 1);
}

#[tokio::test]
async fn test_unreachable_playlist_is_reported() {
    let fixture = Fixture::new();
    let base = fixture.start().await;
    let url = base.join("missing/index.m3u8").unwrap();

    let root = tempfile::tempdir().unwrap();
    let task = task(root.path(), OutputMode::Playlist);

    let (listener, mut rx) = ChannelListener::new();
    task.download_url(url.as_str(), None, &listener).unwrap();
    let events = until_terminal(&mut rx).await;

    assert!(matches!(events.first(), Some(DownloadEvent::Start)));
    assert!(matches!(
        events.last(),
        Some(DownloadEvent::Error(HlsDownloaderError::PlaylistError(_)))
    ));
    assert!(!task.is_running());
}

#[tokio::test]
async fn test_dropped_listener_gets_nothing() {
    let fixture = Fixture::new();
    fixture.serve("vod/a.ts", "a");
    let base = fixture.start().await;

    let root = tempfile::tempdir().unwrap();
    let task = task(root.path(), OutputMode::Playlist);
    let playlist = vod_playlist(&base, &["a.ts"], &root.path().join("vod"));

    let (listener, mut rx) = ChannelListener::new();
    task.download(playlist, None, &listener).unwrap();
    drop(listener);

    // The only sender lived in the listener
    let next = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
    assert!(matches!(next, Ok(None)));
}

#[tokio::test]
async fn test_segments_are_written_under_obfuscated_names() {
    let fixture = Fixture::new();
    fixture.serve("vod/clip.ts", "clip");
    let base = fixture.start().await;

    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("vod");
    let task = task(root.path(), OutputMode::Playlist);
    let playlist = vod_playlist(&base, &["clip.ts"], &dir);

    let (listener, mut rx) = ChannelListener::new();
    task.download(playlist.clone(), Some("secret"), &listener)
        .unwrap();
    success(&until_terminal(&mut rx).await);

    let hidden = HashedSegmentNamer
        .file_name(Some("secret"), &playlist.segments[0])
        .unwrap();
    let plain = HashedSegmentNamer
        .file_name(None, &playlist.segments[0])
        .unwrap();
    assert!(dir.join(&hidden).exists());
    assert!(!dir.join(&plain).exists());
    assert!(
        std::fs::read_dir(&dir)
            .unwrap()
            .all(|e| !e.unwrap().file_name().to_string_lossy().ends_with(".part"))
    );
}
