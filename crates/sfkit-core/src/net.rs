//! Async TCP helpers for readiness probing.

use std::time::Duration;

use sfkit_proto::constants::MAX_READINESS_REPLY_SIZE;
use sfkit_proto::role::NodeAddr;
use sfkit_proto::{BootError, BootResult, ReadinessReply};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error};

/// Connect to a node's readiness listener, giving up after `timeout`.
pub async fn connect_with_timeout(addr: &NodeAddr, timeout: Duration) -> BootResult<TcpStream> {
    debug!("connecting to {}", addr);

    let stream = tokio::time::timeout(timeout, TcpStream::connect((addr.host.as_str(), addr.port)))
        .await
        .map_err(|_| BootError::ProbeTimeout {
            addr: addr.to_string(),
        })?
        .map_err(|e| BootError::Network(e.to_string()))?;

    stream.set_nodelay(true).ok();
    Ok(stream)
}

/// Create a TCP listener on the given address and port.
pub async fn create_listen_socket(bind_addr: &str, port: u16) -> BootResult<TcpListener> {
    let addr = if bind_addr.contains(':') {
        format!("[{}]:{}", bind_addr, port)
    } else {
        format!("{}:{}", bind_addr, port)
    };
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!("failed to bind to {}: {}", addr, e);
        BootError::Bind {
            addr: addr.clone(),
            message: e.to_string(),
        }
    })?;

    debug!("listening on {}", addr);
    Ok(listener)
}

/// Read one length-prefixed readiness reply from a connected stream.
pub async fn read_readiness_reply(stream: &mut TcpStream) -> BootResult<ReadinessReply> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|_| BootError::BadReply)?;
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_READINESS_REPLY_SIZE {
        return Err(BootError::BadReply);
    }

    let mut frame = Vec::with_capacity(4 + len as usize);
    frame.extend_from_slice(&len_buf);
    frame.resize(4 + len as usize, 0);
    stream
        .read_exact(&mut frame[4..])
        .await
        .map_err(|_| BootError::BadReply)?;
    ReadinessReply::decode(&frame)
}

/// Probe a node once and return its reply, if it sent a decodable one.
///
/// Connect failures are errors; a listener that accepts but does not
/// answer still counts as reachable and yields `Ok(None)`.
pub async fn query_readiness(
    addr: &NodeAddr,
    timeout: Duration,
) -> BootResult<Option<ReadinessReply>> {
    let mut stream = connect_with_timeout(addr, timeout).await?;
    match tokio::time::timeout(timeout, read_readiness_reply(&mut stream)).await {
        Ok(Ok(reply)) => Ok(Some(reply)),
        Ok(Err(e)) => {
            debug!("{} accepted the probe without a valid reply: {}", addr, e);
            Ok(None)
        }
        Err(_) => Ok(None),
    }
}
