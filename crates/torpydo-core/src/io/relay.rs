//! Bidirectional relay with a per-direction byte transform.
//!
//! Both directions of a session are driven as poll-based state machines
//! inside a single future, so back-pressure on one direction never stalls
//! the other. Each direction carries a transform that is applied in place
//! to every chunk right after it is read — a node uses this to peel or add
//! its encryption layer while streaming, and the transform therefore
//! advances by exactly the number of bytes read.
//!
//! Writes are batched: a flush only happens when the reader runs dry
//! (`Pending`) or hits EOF, the same strategy `tokio::io::copy` uses.
//!
//! The relay resolves as soon as *either* direction terminates. A session's
//! two sockets live and die together, so the caller drops both streams on
//! return and the peer direction is torn down with them.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Byte totals for a finished relay session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayTotals {
    /// Bytes pumped source → destination.
    pub forward: u64,
    /// Bytes pumped destination → source.
    pub reverse: u64,
}

/// One direction of the relay.
enum PumpState {
    /// Reading; `unflushed` bytes were written since the last flush.
    Read { unflushed: usize },
    /// Writing `buf[at..end]`; carries the unflushed count forward.
    Write {
        at: usize,
        end: usize,
        unflushed: usize,
    },
    /// Flushing `report` bytes; `eof` when the reader already ended.
    Flush { report: usize, eof: bool },
    Shutdown,
    Finished,
}

enum PumpEvent {
    /// Bytes were flushed through to the writer.
    Progress(usize),
    /// This direction is done (EOF observed and writer shut down).
    Eof,
}

fn poll_pump<R, W, F>(
    cx: &mut Context<'_>,
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
    state: &mut PumpState,
    transform: &mut F,
) -> Poll<io::Result<PumpEvent>>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
    F: FnMut(&mut [u8]),
{
    loop {
        match state {
            PumpState::Read { unflushed } => {
                let mut read_buf = ReadBuf::new(buf);
                match Pin::new(&mut *reader).poll_read(cx, &mut read_buf) {
                    Poll::Ready(Ok(())) => {
                        let n = read_buf.filled().len();
                        if n == 0 {
                            let report = *unflushed;
                            *state = if report > 0 {
                                PumpState::Flush { report, eof: true }
                            } else {
                                PumpState::Shutdown
                            };
                        } else {
                            // Exactly once per chunk, before any write retry.
                            transform(&mut buf[..n]);
                            let unflushed = *unflushed;
                            *state = PumpState::Write {
                                at: 0,
                                end: n,
                                unflushed,
                            };
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => {
                        if *unflushed > 0 {
                            let report = *unflushed;
                            *state = PumpState::Flush { report, eof: false };
                        } else {
                            return Poll::Pending;
                        }
                    }
                }
            }
            PumpState::Write { at, end, unflushed } => {
                match Pin::new(&mut *writer).poll_write(cx, &buf[*at..*end]) {
                    Poll::Ready(Ok(0)) => {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "relay peer stopped accepting bytes",
                        )));
                    }
                    Poll::Ready(Ok(n)) => {
                        *at += n;
                        if *at >= *end {
                            let unflushed = *unflushed + *end;
                            *state = PumpState::Read { unflushed };
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            PumpState::Flush { report, eof } => {
                let (report, eof) = (*report, *eof);
                match Pin::new(&mut *writer).poll_flush(cx) {
                    Poll::Ready(Ok(())) => {
                        *state = if eof {
                            PumpState::Shutdown
                        } else {
                            PumpState::Read { unflushed: 0 }
                        };
                        return Poll::Ready(Ok(PumpEvent::Progress(report)));
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            PumpState::Shutdown => match Pin::new(&mut *writer).poll_shutdown(cx) {
                Poll::Ready(_) => {
                    *state = PumpState::Finished;
                    return Poll::Ready(Ok(PumpEvent::Eof));
                }
                Poll::Pending => return Poll::Pending,
            },
            PumpState::Finished => return Poll::Ready(Ok(PumpEvent::Eof)),
        }
    }
}

/// Pump bytes between `source` and `destination` until either side ends.
///
/// `forward_transform` is applied to every chunk travelling
/// source → destination, `reverse_transform` to every chunk travelling
/// destination → source, each in place and exactly once.
///
/// Returns the byte totals of both directions at the moment the first
/// direction terminated. Both streams are consumed; dropping them on
/// return closes the session atomically.
pub async fn relay_bidirectional<A, B, FA, FB>(
    source: A,
    destination: B,
    buffer_size: usize,
    mut forward_transform: FA,
    mut reverse_transform: FB,
) -> io::Result<RelayTotals>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
    FA: FnMut(&mut [u8]),
    FB: FnMut(&mut [u8]),
{
    let (mut src_r, mut src_w) = tokio::io::split(source);
    let (mut dst_r, mut dst_w) = tokio::io::split(destination);

    let mut fwd_buf = vec![0u8; buffer_size];
    let mut rev_buf = vec![0u8; buffer_size];
    let mut fwd_state = PumpState::Read { unflushed: 0 };
    let mut rev_state = PumpState::Read { unflushed: 0 };

    let mut totals = RelayTotals::default();

    std::future::poll_fn(|cx| {
        loop {
            let mut progressed = false;

            match poll_pump(
                cx,
                &mut src_r,
                &mut dst_w,
                &mut fwd_buf,
                &mut fwd_state,
                &mut forward_transform,
            ) {
                Poll::Ready(Ok(PumpEvent::Progress(n))) => {
                    totals.forward += n as u64;
                    progressed = true;
                }
                Poll::Ready(Ok(PumpEvent::Eof)) => return Poll::Ready(Ok(())),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => {}
            }

            match poll_pump(
                cx,
                &mut dst_r,
                &mut src_w,
                &mut rev_buf,
                &mut rev_state,
                &mut reverse_transform,
            ) {
                Poll::Ready(Ok(PumpEvent::Progress(n))) => {
                    totals.reverse += n as u64;
                    progressed = true;
                }
                Poll::Ready(Ok(PumpEvent::Eof)) => return Poll::Ready(Ok(())),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => {}
            }

            if !progressed {
                return Poll::Pending;
            }
        }
    })
    .await?;

    Ok(totals)
}
