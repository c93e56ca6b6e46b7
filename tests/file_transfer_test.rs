use std::path::Path;
use std::time::Duration;

use lanchat::{ChatConfig, ChatConnection, ChatError, ChatEvent, ChatListener, EventReceiver};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

type Side = (ChatConnection, EventReceiver);

async fn connected_pair(download_dir: &Path) -> anyhow::Result<(Side, Side)> {
    let listener = ChatListener::bind(0).await?;
    let port = listener.local_addr()?.port();

    let config = ChatConfig {
        port,
        download_dir: download_dir.to_path_buf(),
        display_name: "test".to_string(),
        read_buffer_size: 1024,
    };

    let accept_config = config.clone();
    let accept = tokio::spawn(async move { listener.accept(&accept_config).await });
    let dial_side = ChatConnection::connect("127.0.0.1", &config).await?;
    let listen_side = accept.await??;
    Ok((listen_side, dial_side))
}

/// Accept one of our connections but drive the other side with a raw
/// socket, so tests control exactly how bytes hit the wire.
async fn accepted_with_raw_peer(download_dir: &Path) -> anyhow::Result<(Side, TcpStream)> {
    let listener = ChatListener::bind(0).await?;
    let port = listener.local_addr()?.port();

    let config = ChatConfig {
        port,
        download_dir: download_dir.to_path_buf(),
        display_name: "test".to_string(),
        read_buffer_size: 1024,
    };

    let accept = tokio::spawn(async move { listener.accept(&config).await });
    let raw = TcpStream::connect(("127.0.0.1", port)).await?;
    let listen_side = accept.await??;
    Ok((listen_side, raw))
}

async fn next_event(rx: &mut EventReceiver) -> ChatEvent {
    timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_large_file_arrives_byte_identical() -> anyhow::Result<()> {
    let send_dir = tempfile::tempdir()?;
    let recv_dir = tempfile::tempdir()?;
    let ((listener, mut listener_rx), (dialer, _dialer_rx)) = connected_pair(recv_dir.path()).await?;

    // Much larger than one 1024-byte read, with a pattern that makes
    // misordered reassembly visible.
    let original: Vec<u8> = (0..64 * 1024 + 7).map(|i| (i % 251) as u8).collect();
    let source = send_dir.path().join("report.pdf");
    tokio::fs::write(&source, &original).await?;

    dialer.send_file(&source).await?;

    match next_event(&mut listener_rx).await {
        ChatEvent::FileReceived { name, path, size } => {
            assert_eq!(name, "report.pdf");
            assert_eq!(size, original.len() as u64);
            assert_eq!(path, recv_dir.path().join("report.pdf"));
            let received = tokio::fs::read(&path).await?;
            assert_eq!(received, original);
        }
        other => panic!("expected file event, got {other:?}"),
    }

    listener.close().await;
    dialer.close().await;
    Ok(())
}

#[tokio::test]
async fn test_empty_file_transfer() -> anyhow::Result<()> {
    let send_dir = tempfile::tempdir()?;
    let recv_dir = tempfile::tempdir()?;
    let ((listener, mut listener_rx), (dialer, _dialer_rx)) = connected_pair(recv_dir.path()).await?;

    let source = send_dir.path().join("empty.bin");
    tokio::fs::write(&source, b"").await?;

    dialer.send_file(&source).await?;

    match next_event(&mut listener_rx).await {
        ChatEvent::FileReceived { name, size, path } => {
            assert_eq!(name, "empty.bin");
            assert_eq!(size, 0);
            assert_eq!(tokio::fs::read(&path).await?.len(), 0);
        }
        other => panic!("expected file event, got {other:?}"),
    }

    listener.close().await;
    dialer.close().await;
    Ok(())
}

#[tokio::test]
async fn test_missing_file_leaves_connection_usable() -> anyhow::Result<()> {
    let recv_dir = tempfile::tempdir()?;
    let ((listener, mut listener_rx), (dialer, _dialer_rx)) = connected_pair(recv_dir.path()).await?;

    let err = dialer
        .send_file("/no/such/file.bin")
        .await
        .expect_err("missing file must fail");
    assert!(matches!(err, ChatError::FileNotFound(_)));

    // The failure is local to the caller; the connection still works.
    dialer.send("still alive").await?;
    assert_eq!(
        next_event(&mut listener_rx).await,
        ChatEvent::Message("still alive".to_string())
    );

    listener.close().await;
    dialer.close().await;
    Ok(())
}

#[tokio::test]
async fn test_payload_split_across_partial_writes() -> anyhow::Result<()> {
    let recv_dir = tempfile::tempdir()?;
    let ((listener, mut listener_rx), mut raw) = accepted_with_raw_peer(recv_dir.path()).await?;

    raw.write_all(b"FILE|parts.bin|10|").await?;
    sleep(Duration::from_millis(50)).await;
    raw.write_all(b"abcd").await?;
    sleep(Duration::from_millis(50)).await;
    raw.write_all(b"efghij").await?;

    match next_event(&mut listener_rx).await {
        ChatEvent::FileReceived { name, path, size } => {
            assert_eq!(name, "parts.bin");
            assert_eq!(size, 10);
            assert_eq!(tokio::fs::read(&path).await?, b"abcdefghij");
        }
        other => panic!("expected file event, got {other:?}"),
    }

    listener.close().await;
    Ok(())
}

#[tokio::test]
async fn test_payload_coalesced_with_header() -> anyhow::Result<()> {
    let recv_dir = tempfile::tempdir()?;
    let ((listener, mut listener_rx), mut raw) = accepted_with_raw_peer(recv_dir.path()).await?;

    // Header and full payload in one write, landing in one read.
    raw.write_all(b"FILE|one-shot.bin|4|\x01\x02\x03\x04").await?;

    match next_event(&mut listener_rx).await {
        ChatEvent::FileReceived { name, path, size } => {
            assert_eq!(name, "one-shot.bin");
            assert_eq!(size, 4);
            assert_eq!(tokio::fs::read(&path).await?, vec![1, 2, 3, 4]);
        }
        other => panic!("expected file event, got {other:?}"),
    }

    listener.close().await;
    Ok(())
}

#[tokio::test]
async fn test_wire_file_name_cannot_escape_download_dir() -> anyhow::Result<()> {
    let recv_dir = tempfile::tempdir()?;
    let ((listener, mut listener_rx), mut raw) = accepted_with_raw_peer(recv_dir.path()).await?;

    raw.write_all(b"FILE|../../escape.bin|4|abcd").await?;

    match next_event(&mut listener_rx).await {
        ChatEvent::FileReceived { name, path, .. } => {
            assert_eq!(name, "escape.bin");
            assert_eq!(path, recv_dir.path().join("escape.bin"));
            assert!(path.exists());
        }
        other => panic!("expected file event, got {other:?}"),
    }

    listener.close().await;
    Ok(())
}

#[tokio::test]
async fn test_chat_resumes_after_file_transfer() -> anyhow::Result<()> {
    let send_dir = tempfile::tempdir()?;
    let recv_dir = tempfile::tempdir()?;
    let ((listener, mut listener_rx), (dialer, _dialer_rx)) = connected_pair(recv_dir.path()).await?;

    let source = send_dir.path().join("notes.txt");
    tokio::fs::write(&source, b"some notes").await?;

    dialer.send_file(&source).await?;
    sleep(Duration::from_millis(50)).await;
    dialer.send("did you get it?").await?;

    assert!(matches!(
        next_event(&mut listener_rx).await,
        ChatEvent::FileReceived { .. }
    ));
    assert_eq!(
        next_event(&mut listener_rx).await,
        ChatEvent::Message("did you get it?".to_string())
    );

    listener.close().await;
    dialer.close().await;
    Ok(())
}

#[tokio::test]
async fn test_truncated_transfer_is_fatal() -> anyhow::Result<()> {
    let recv_dir = tempfile::tempdir()?;
    let ((listener, mut listener_rx), mut raw) = accepted_with_raw_peer(recv_dir.path()).await?;

    // Declare 10 bytes, deliver 4, then hang up.
    raw.write_all(b"FILE|short.bin|10|abcd").await?;
    sleep(Duration::from_millis(50)).await;
    drop(raw);

    match next_event(&mut listener_rx).await {
        ChatEvent::Status(status) => assert!(status.contains("file receive failed")),
        other => panic!("expected status event, got {other:?}"),
    }

    listener.close().await;
    Ok(())
}
