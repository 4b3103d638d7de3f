//! End-to-end scenarios from §8, run against the loopback server in
//! `testutil` rather than a live origin.

use std::sync::Arc;
use std::time::Duration;

use crate::configs::FetchConfig;
use crate::controller::{DownloadJob, JobOutcome, JobRegistry, PipelineController};
use crate::progress::InProcessProgress;
use crate::testutil::{Body, LoopbackServer};

fn temp_dir(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("hlsfetch-scenario-{label}-{}", uuid::Uuid::new_v4()))
}

async fn run_job(url: String, dir: &std::path::Path, config: FetchConfig) -> JobOutcome {
    let registry = Arc::new(JobRegistry::new());
    let progress = Arc::new(InProcessProgress::new());
    let controller = PipelineController::new(registry, progress).unwrap();
    let job = DownloadJob::new(url, "out", dir.to_string_lossy().to_string(), config);
    controller.run(job).await
}

/// S1 - small TS stream: 10 x 1 MiB segments, no init, byte 0 = 0x47.
#[tokio::test]
async fn s1_small_ts_stream() {
    let mut routes = Vec::new();
    let mut playlist = String::from("#EXTM3U\n");
    for i in 0..10 {
        playlist.push_str("#EXTINF:6.0,\n");
        playlist.push_str(&format!("seg{i}.ts\n"));
        let mut bytes = vec![0x47u8; 1024 * 1024];
        bytes[0] = 0x47;
        routes.push((Box::leak(format!("/seg{i}.ts").into_boxed_str()) as &'static str, Body::Bytes(bytes)));
    }
    routes.push(("/media.m3u8", Body::Bytes(playlist.into_bytes())));
    let server = LoopbackServer::start(routes).await;

    let dir = temp_dir("s1");
    let outcome = run_job(server.url("/media.m3u8"), &dir, FetchConfig::default()).await;

    match outcome {
        JobOutcome::Done { output_path } => {
            let bytes = tokio::fs::read(&output_path).await.unwrap();
            assert_eq!(bytes.len(), 10 * 1024 * 1024);
            assert_eq!(bytes[0], 0x47);
        }
        JobOutcome::Failed(err) => panic!("expected success, got {err}"),
        JobOutcome::Cancelled => panic!("expected success, got cancelled"),
        JobOutcome::DonePartitioned { .. } => panic!("expected a single output, got parts"),
    }

    tokio::fs::remove_dir_all(&dir).await.ok();
}

/// S2 - FMP4 with init: EXT-X-MAP init (2 KiB, ftyp at offset 4) + 20 segments.
#[tokio::test]
async fn s2_fmp4_with_init() {
    let mut init_bytes = vec![0u8; 2048];
    init_bytes[4..8].copy_from_slice(b"ftyp");

    let mut routes = vec![("/init.mp4", Body::Bytes(init_bytes.clone()))];
    let mut playlist = String::from("#EXTM3U\n#EXT-X-MAP:URI=\"init.mp4\"\n");
    let mut seg_storage = Vec::new();
    for i in 0..20 {
        playlist.push_str("#EXTINF:4.0,\n");
        playlist.push_str(&format!("frag{i}.m4s\n"));
        seg_storage.push(vec![0xAAu8; 1024]);
    }
    for (i, bytes) in seg_storage.iter().enumerate() {
        routes.push((
            Box::leak(format!("/frag{i}.m4s").into_boxed_str()) as &'static str,
            Body::Bytes(bytes.clone()),
        ));
    }
    routes.push(("/media.m3u8", Body::Bytes(playlist.into_bytes())));
    let server = LoopbackServer::start(routes).await;

    let dir = temp_dir("s2");
    let outcome = run_job(server.url("/media.m3u8"), &dir, FetchConfig::default()).await;

    match outcome {
        JobOutcome::Done { output_path } => {
            let bytes = tokio::fs::read(&output_path).await.unwrap();
            assert_eq!(&bytes[4..8], b"ftyp");
            assert_eq!(bytes.len(), 2048 + 20 * 1024);
        }
        JobOutcome::Failed(err) => panic!("expected success, got {err}"),
        JobOutcome::Cancelled => panic!("expected success, got cancelled"),
        JobOutcome::DonePartitioned { .. } => panic!("expected a single output, got parts"),
    }

    tokio::fs::remove_dir_all(&dir).await.ok();
}

/// S3 - transient 503 storm: odd-indexed segments 503 once then succeed.
#[tokio::test]
async fn s3_transient_503_storm() {
    let mut routes = Vec::new();
    let mut playlist = String::from("#EXTM3U\n");
    for i in 0..50 {
        playlist.push_str("#EXTINF:6.0,\n");
        playlist.push_str(&format!("seg{i}.ts\n"));
        let body = if i % 2 == 1 {
            Body::FlakyThenOk {
                status: 503,
                flips_after: 1,
                bytes: vec![0x47; 188],
            }
        } else {
            Body::Bytes(vec![0x47; 188])
        };
        routes.push((Box::leak(format!("/seg{i}.ts").into_boxed_str()) as &'static str, body));
    }
    routes.push(("/media.m3u8", Body::Bytes(playlist.into_bytes())));
    let server = LoopbackServer::start(routes).await;

    let dir = temp_dir("s3");
    let outcome = run_job(server.url("/media.m3u8"), &dir, FetchConfig::default()).await;

    match outcome {
        JobOutcome::Done { output_path } => {
            let bytes = tokio::fs::read(&output_path).await.unwrap();
            assert_eq!(bytes.len(), 50 * 188);
        }
        JobOutcome::Failed(err) => panic!("expected success, got {err}"),
        JobOutcome::Cancelled => panic!("expected success, got cancelled"),
        JobOutcome::DonePartitioned { .. } => panic!("expected a single output, got parts"),
    }

    tokio::fs::remove_dir_all(&dir).await.ok();
}

/// S4 - fatal gap: segments 10..14 (five in a row) return 404.
#[tokio::test]
async fn s4_fatal_gap() {
    let mut routes = Vec::new();
    let mut playlist = String::from("#EXTM3U\n");
    for i in 0..100 {
        playlist.push_str("#EXTINF:6.0,\n");
        playlist.push_str(&format!("seg{i}.ts\n"));
        let body = if (10..15).contains(&i) {
            Body::Status(404)
        } else {
            Body::Bytes(vec![0x47; 188])
        };
        routes.push((Box::leak(format!("/seg{i}.ts").into_boxed_str()) as &'static str, body));
    }
    routes.push(("/media.m3u8", Body::Bytes(playlist.into_bytes())));
    let server = LoopbackServer::start(routes).await;

    let dir = temp_dir("s4");
    let outcome = run_job(server.url("/media.m3u8"), &dir, FetchConfig::default()).await;

    match outcome {
        JobOutcome::Failed(err) => {
            assert_eq!(err.kind(), "FetchFloor");
            assert!(err.to_string().contains("max_consecutive_missing=5"));
        }
        _ => panic!("expected FetchFloor failure, got a different outcome"),
    }
    tokio::fs::remove_dir_all(&dir).await.ok();
}

/// S5 - missing init workaround: FMP4 media playlist without EXT-X-MAP,
/// first segment carries a moov atom ending at 180 KiB.
#[tokio::test]
async fn s5_missing_init_workaround() {
    const MOOV_END: usize = 180 * 1024;
    let mut first_segment = vec![0u8; MOOV_END + 4096];
    first_segment[4..8].copy_from_slice(b"ftyp");
    let moov_offset = 64;
    first_segment[moov_offset + 4..moov_offset + 8].copy_from_slice(b"moov");
    let moov_size = (MOOV_END - moov_offset) as u32;
    first_segment[moov_offset..moov_offset + 4].copy_from_slice(&moov_size.to_be_bytes());

    let mut routes = vec![("/frag0.m4s", Body::Bytes(first_segment))];
    let mut playlist = String::from("#EXTM3U\n");
    for i in 0..5 {
        playlist.push_str("#EXTINF:4.0,\n");
        playlist.push_str(&format!("frag{i}.m4s\n"));
        if i > 0 {
            routes.push((
                Box::leak(format!("/frag{i}.m4s").into_boxed_str()) as &'static str,
                Body::Bytes(vec![0xBBu8; 1024]),
            ));
        }
    }
    routes.push(("/media.m3u8", Body::Bytes(playlist.into_bytes())));
    let server = LoopbackServer::start(routes).await;

    let dir = temp_dir("s5");
    let outcome = run_job(server.url("/media.m3u8"), &dir, FetchConfig::default()).await;

    match outcome {
        JobOutcome::Done { output_path } => {
            let bytes = tokio::fs::read(&output_path).await.unwrap();
            assert_eq!(&bytes[4..8], b"ftyp");
        }
        JobOutcome::Failed(err) => panic!("expected success, got {err}"),
        JobOutcome::Cancelled => panic!("expected success, got cancelled"),
        JobOutcome::DonePartitioned { .. } => panic!("expected a single output, got parts"),
    }

    tokio::fs::remove_dir_all(&dir).await.ok();
}

/// S6 - cancellation mid-batch: N=200, cancel triggered after a few batches.
#[tokio::test]
async fn s6_cancellation_mid_batch() {
    let mut routes = Vec::new();
    let mut playlist = String::from("#EXTM3U\n");
    for i in 0..200 {
        playlist.push_str("#EXTINF:6.0,\n");
        playlist.push_str(&format!("seg{i}.ts\n"));
        routes.push((Box::leak(format!("/seg{i}.ts").into_boxed_str()) as &'static str, Body::Bytes(vec![0x47; 188])));
    }
    routes.push(("/media.m3u8", Body::Bytes(playlist.into_bytes())));
    let server = LoopbackServer::start(routes).await;

    let dir = temp_dir("s6");
    let registry = Arc::new(JobRegistry::new());
    let progress = Arc::new(InProcessProgress::new());
    let controller = PipelineController::new(registry, progress).unwrap();
    let job = DownloadJob::new(
        server.url("/media.m3u8"),
        "out",
        dir.to_string_lossy().to_string(),
        FetchConfig::default(),
    );
    let token = job.cancel_token.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let start = std::time::Instant::now();
    let outcome = controller.run(job).await;
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(matches!(outcome, JobOutcome::Cancelled));
    assert!(!dir.join("out.ts").exists());

    tokio::fs::remove_dir_all(&dir).await.ok();
}

/// S7 - part mode: 10 x 188-byte TS segments (1880 bytes total), forced
/// into the large regime with a small spill chunk size, split into
/// 376-byte (2-packet) parts.
#[tokio::test]
async fn s7_part_mode_multiple_parts() {
    let mut routes = Vec::new();
    let mut playlist = String::from("#EXTM3U\n");
    for i in 0..10 {
        playlist.push_str("#EXTINF:6.0,\n");
        playlist.push_str(&format!("seg{i}.ts\n"));
        routes.push((Box::leak(format!("/seg{i}.ts").into_boxed_str()) as &'static str, Body::Bytes(vec![0x47; 188])));
    }
    routes.push(("/media.m3u8", Body::Bytes(playlist.into_bytes())));
    let server = LoopbackServer::start(routes).await;

    let mut config = FetchConfig::default();
    config.large_regime_threshold_bytes = 0;
    config.spill_chunk_bytes = 564;
    config.part_size_bytes = 376;

    let dir = temp_dir("s7");
    let registry = Arc::new(JobRegistry::new());
    let progress = Arc::new(InProcessProgress::new());
    let controller = PipelineController::new(registry, progress).unwrap();
    let job = DownloadJob::new(server.url("/media.m3u8"), "out", dir.to_string_lossy().to_string(), config)
        .with_part_mode(true);

    let outcome = controller.run(job).await;

    match outcome {
        JobOutcome::DonePartitioned { part_paths } => {
            assert_eq!(part_paths.len(), 5);
            let mut total = 0u64;
            for (i, path) in part_paths.iter().enumerate() {
                assert_eq!(path.file_name().unwrap().to_str().unwrap(), format!("out_part{i}.ts"));
                let bytes = tokio::fs::read(path).await.unwrap();
                assert_eq!(bytes.len(), 376);
                total += bytes.len() as u64;
            }
            assert_eq!(total, 1880);
        }
        JobOutcome::Done { .. } => panic!("expected partitioned output, got a single file"),
        JobOutcome::Failed(err) => panic!("expected success, got {err}"),
        JobOutcome::Cancelled => panic!("expected success, got cancelled"),
    }

    tokio::fs::remove_dir_all(&dir).await.ok();
}
