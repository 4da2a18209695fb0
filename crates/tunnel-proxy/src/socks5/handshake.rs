//! Greeting and method selection

use super::io::{read_at_least, read_full};
use super::{METHOD_NO_AUTH, SOCKS_VERSION};
use crate::error::{Phase, ProxyError, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Version byte, method count, and up to 255 methods
const GREETING_BUF_LEN: usize = 258;

/// Consume the client greeting and select "no authentication".
///
/// The reply is `[0x05, 0x00]` whatever methods the client listed. Nothing
/// is written when the greeting is rejected.
pub async fn negotiate<S>(stream: &mut S, read_timeout: Duration) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; GREETING_BUF_LEN];

    let n = read_at_least(stream, &mut buf, 2, read_timeout).await?;
    if buf[0] != SOCKS_VERSION {
        return Err(ProxyError::UnsupportedVersion(buf[0]));
    }

    let nmethods = buf[1] as usize;
    let msg_len = 2 + nmethods;
    if n < msg_len {
        read_full(stream, &mut buf[n..msg_len], read_timeout).await?;
    } else if n > msg_len {
        return Err(ProxyError::ExtraData {
            phase: Phase::Greeting,
            expected: msg_len,
            received: n,
        });
    }

    debug!("Client offered {} auth methods: {:?}", nmethods, &buf[2..msg_len]);

    stream.write_all(&[SOCKS_VERSION, METHOD_NO_AUTH]).await?;
    Ok(())
}
