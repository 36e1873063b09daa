use std::io::Cursor;
use std::sync::Arc;

use storlink_checksum::{ChannelSink, ChecksumRequest};
use storlink_dsi::{Command, DsiConfig, DsiError, PosixDsi, SpaceQuotaCheck, SpaceUsage};
use storlink_protocol::{ByteRange, ErrorKind};
use storlink_transfer::{LoopbackTransport, MemoryStorage};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn path_in(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

fn small_blocks() -> DsiConfig {
    DsiConfig {
        block_size: 4096,
        concurrency: 3,
        ..DsiConfig::default()
    }
}

struct OverQuota;

impl SpaceUsage for OverQuota {
    fn space_attributes(&self, _group: &str) -> Option<String> {
        Some("oss.cgroup=atlas&oss.used=2048&oss.quota=1024".into())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn receive_then_send_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let stored = path_in(&dir, "stored");
    let copy = path_in(&dir, "copy");
    let data = pattern(50_000);
    let dsi = PosixDsi::new(small_blocks()).unwrap();
    assert_eq!(dsi.config().block_size, 4096);

    let (transport, finished) = LoopbackTransport::receiving_from(
        Cursor::new(data.clone()),
        dsi.loopback_config(ByteRange::unbounded(0)),
    )
    .unwrap();
    let _receive = dsi.start_receive(&stored, transport.clone());
    let outcome = finished.await.unwrap();
    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert_eq!(outcome.stats.bytes, data.len() as u64);
    assert_eq!(transport.bytes_accounted(), data.len() as u64);
    assert_eq!(std::fs::read(&stored).unwrap(), data);

    let sink = tokio::fs::File::create(&copy).await.unwrap();
    let (transport, finished) =
        LoopbackTransport::sending_to(sink, dsi.loopback_config(ByteRange::bounded(1000, 20_000)))
            .unwrap();
    let _send = dsi.start_send(&stored, transport);
    let outcome = finished.await.unwrap();
    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert_eq!(std::fs::read(&copy).unwrap(), &data[1000..21_000]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn checksum_command_reports_digest() {
    let dir = tempfile::tempdir().unwrap();
    let path = path_in(&dir, "obj");
    std::fs::write(&path, b"hello world").unwrap();
    let dsi = PosixDsi::new(DsiConfig::default()).unwrap();

    let (sink, result, _progress) = ChannelSink::channel();
    let handle = dsi.command(
        Command::Checksum {
            path,
            algorithm: "MD5".into(),
            offset: 0,
            length: None,
        },
        sink,
        CancellationToken::new(),
    );
    assert!(handle.is_some());
    assert_eq!(
        result.await.unwrap(),
        Ok("5eb63bbbe01eeed093cb22bb8f5acdc3".to_string())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn checksum_uses_swapped_storage() {
    let storage = Arc::new(MemoryStorage::new());
    storage.insert("/mem/obj", b"xxWikipedia".to_vec());
    let dsi = PosixDsi::new(DsiConfig::default())
        .unwrap()
        .with_storage(storage);

    let (sink, result, _progress) = ChannelSink::channel();
    dsi.start_checksum(
        ChecksumRequest {
            path: "/mem/obj".into(),
            algorithm: "adler32".into(),
            range: ByteRange::unbounded(2),
        },
        sink,
        CancellationToken::new(),
    );
    assert_eq!(result.await.unwrap(), Ok("11e60398".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn configured_helper_answers_checksums() {
    let dir = tempfile::tempdir().unwrap();
    let path = path_in(&dir, "obj");
    std::fs::write(&path, b"payload").unwrap();
    let mut config = DsiConfig::default();
    config
        .checksum
        .helpers
        .insert("adler32".into(), "echo 0badc0de".into());
    let dsi = PosixDsi::new(config).unwrap();

    let (sink, result, _progress) = ChannelSink::channel();
    let handle = dsi.command(
        Command::Checksum {
            path,
            algorithm: "adler32".into(),
            offset: 0,
            length: None,
        },
        sink,
        CancellationToken::new(),
    );
    handle.unwrap().await.unwrap();
    assert_eq!(result.await.unwrap(), Ok("0badc0de".to_string()));
}

#[tokio::test]
async fn other_commands_are_unsupported() {
    let dsi = PosixDsi::new(DsiConfig::default()).unwrap();
    let (sink, result, _progress) = ChannelSink::channel();

    let handle = dsi.command(
        Command::Mkdir {
            path: "/tmp/new".into(),
        },
        sink,
        CancellationToken::new(),
    );

    assert!(handle.is_none());
    let report = result.await.unwrap().unwrap_err();
    assert_eq!(report.kind, ErrorKind::UnsupportedCommand);
    assert_eq!(report.operation, "mkdir");
    assert_eq!(report.message, "unsupported command: mkdir");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn quota_denial_never_creates_target() {
    let dir = tempfile::tempdir().unwrap();
    let target = path_in(&dir, "f");
    let dsi = PosixDsi::new(small_blocks())
        .unwrap()
        .with_preflight(Arc::new(SpaceQuotaCheck::new(OverQuota)));

    let (transport, finished) = LoopbackTransport::receiving_from(
        Cursor::new(pattern(100)),
        dsi.loopback_config(ByteRange::unbounded(0)),
    )
    .unwrap();
    let transfer = dsi.start_receive(&format!("{target}?spacetoken=atlas"), transport);

    let report = finished.await.unwrap().failure().unwrap();
    assert_eq!(report.kind, ErrorKind::PreflightDenied);
    assert!(report.message.contains("quota exceeded for space token atlas"));
    assert!(transfer.is_finished());
    assert!(!dir.path().join("f").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn path_rewrite_redirects_receive() {
    let dir = tempfile::tempdir().unwrap();
    let logical = path_in(&dir, "logical");
    let physical = path_in(&dir, "physical");
    let config = DsiConfig {
        path_rewrite_helper: Some(format!("echo {physical}")),
        ..small_blocks()
    };
    let dsi = PosixDsi::new(config).unwrap();
    let data = pattern(10_000);

    let (transport, finished) = LoopbackTransport::receiving_from(
        Cursor::new(data.clone()),
        dsi.loopback_config(ByteRange::unbounded(0)),
    )
    .unwrap();
    let _transfer = dsi.start_receive(&logical, transport);
    let outcome = finished.await.unwrap();

    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert_eq!(std::fs::read(&physical).unwrap(), data);
    assert!(!dir.path().join("logical").exists());
}

#[test]
fn construction_needs_a_runtime() {
    assert!(matches!(
        PosixDsi::new(DsiConfig::default()),
        Err(DsiError::NoRuntime(_))
    ));
}

#[test]
fn construction_validates_config() {
    let config = DsiConfig {
        concurrency: 0,
        ..DsiConfig::default()
    };
    assert!(matches!(
        PosixDsi::new(config),
        Err(DsiError::InvalidConfig(_))
    ));
}
