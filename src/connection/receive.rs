use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{debug, info, warn};

use crate::codec;
use crate::connection::ChatEvent;
use crate::error::ChatError;
use crate::utils::{format_size, sanitize_file_name};

/// Everything the receive loop owns for the lifetime of one connection.
pub(crate) struct ReceiveContext {
    pub reader: OwnedReadHalf,
    pub buffer_size: usize,
    pub download_dir: PathBuf,
    pub remote_name: Arc<RwLock<Option<String>>>,
    pub events: mpsc::UnboundedSender<ChatEvent>,
    pub shutdown: watch::Receiver<bool>,
    pub finished: Arc<AtomicBool>,
}

/// The single long-lived task per connection: reads chunks off the
/// stream and dispatches file transfers, name announcements and plain
/// text strictly in arrival order. Ends on peer disconnect, transport
/// fault, or the shutdown signal; never retries.
pub(crate) async fn receive_loop(mut ctx: ReceiveContext) {
    let mut buffer = vec![0u8; ctx.buffer_size];

    loop {
        let n = tokio::select! {
            _ = ctx.shutdown.changed() => break,
            read = ctx.reader.read(&mut buffer) => match read {
                Ok(0) => {
                    info!("peer disconnected");
                    let _ = ctx.events.send(ChatEvent::Status("peer disconnected".to_string()));
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!("read failed: {e}");
                    let _ = ctx.events.send(ChatEvent::Status(format!("read failed: {e}")));
                    break;
                }
            },
        };

        let chunk = &buffer[..n];
        if codec::is_file_header(chunk) {
            match codec::split_file_header(chunk) {
                Ok((header, payload_prefix)) => {
                    let prefix = payload_prefix.to_vec();
                    match receive_file(&mut ctx, &header, prefix).await {
                        Ok(true) => {}
                        // Shutdown was signalled mid transfer
                        Ok(false) => break,
                        Err(e) => {
                            warn!(file = %header.name, "file receive failed: {e}");
                            let _ = ctx
                                .events
                                .send(ChatEvent::Status(format!("file receive failed: {e}")));
                            break;
                        }
                    }
                }
                Err(e) => {
                    // Text that collides with the sentinel but is not a
                    // valid header: report it, then surface it as chat.
                    let err = ChatError::Malformed(e);
                    debug!("{err}");
                    let _ = ctx.events.send(ChatEvent::Status(err.to_string()));
                    let text = String::from_utf8_lossy(chunk).into_owned();
                    let _ = ctx.events.send(ChatEvent::Message(text));
                }
            }
            continue;
        }

        let text = String::from_utf8_lossy(chunk).into_owned();
        if let Some(name) = codec::parse_announcement(&text) {
            debug!(name, "remote display name updated");
            *ctx.remote_name.write().await = Some(name.to_string());
            continue;
        }
        let _ = ctx.events.send(ChatEvent::Message(text));
    }

    ctx.finished.store(true, Ordering::SeqCst);
}

/// Accumulate exactly the declared number of payload bytes, reassembling
/// short reads, then write the file under the download directory.
/// Returns `Ok(false)` if shutdown interrupted the transfer.
async fn receive_file(
    ctx: &mut ReceiveContext,
    header: &codec::FileHeader,
    mut payload: Vec<u8>,
) -> io::Result<bool> {
    // Bytes past the declared length belong to a later send; dropped,
    // same as the text framing does with its one-read-per-send rule.
    payload.truncate(header.len as usize);

    let mut buf = vec![0u8; ctx.buffer_size];
    while (payload.len() as u64) < header.len {
        let remaining = (header.len - payload.len() as u64) as usize;
        let want = remaining.min(buf.len());
        tokio::select! {
            _ = ctx.shutdown.changed() => return Ok(false),
            read = ctx.reader.read(&mut buf[..want]) => {
                let n = read?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "stream ended after {} of {} bytes of {}",
                            payload.len(),
                            header.len,
                            header.name
                        ),
                    ));
                }
                payload.extend_from_slice(&buf[..n]);
            }
        }
    }

    let name = sanitize_file_name(&header.name).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unusable file name {:?}", header.name),
        )
    })?;
    let path = ctx.download_dir.join(&name);
    tokio::fs::write(&path, &payload).await?;

    info!(file = %name, size = %format_size(header.len), "file received");
    let _ = ctx.events.send(ChatEvent::FileReceived {
        name,
        path,
        size: header.len,
    });
    Ok(true)
}
