//! The [`Transport`] trait and the socket implementations.
use bytes::BytesMut;
use std::{
    io,
    task::{Context, Poll},
};

use crate::{
    common::warning,
    config::{ConnectOptions, DEFAULT_SOCKET_PATH, Schema},
};

/// An asynchronous byte channel the connection is parameterised over.
///
/// No protocol-awareness; byte streams only. Two implementations are
/// provided through [`Socket`]: TCP and unix-domain socket.
pub trait Transport: Unpin {
    /// Poll to read some bytes into `buf`.
    ///
    /// Returns the number of bytes read; zero means the remote closed the
    /// stream. The caller reserves buffer capacity beforehand.
    fn poll_read(&mut self, cx: &mut Context, buf: &mut BytesMut) -> Poll<io::Result<usize>>;

    /// Poll to write out the whole of `buf`, advancing it as bytes are
    /// accepted.
    ///
    /// At most one write is in flight at a time; ordering is strictly FIFO.
    fn poll_write(&mut self, cx: &mut Context, buf: &mut BytesMut) -> Poll<io::Result<()>>;

    /// Poll to shut the channel down.
    fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>>;

    /// Whether the channel is currently usable.
    fn is_connected(&self) -> bool;
}

/// An either `TcpStream` or `UnixStream` transport.
///
/// Requires the `tokio` feature, otherwise every operation panics at
/// runtime.
pub struct Socket {
    kind: Kind,
    open: bool,
}

enum Kind {
    #[cfg(feature = "tokio")]
    TokioTcp(tokio::net::TcpStream),
    #[cfg(all(feature = "tokio", unix))]
    TokioUnixSocket(tokio::net::UnixStream),
    #[cfg(not(feature = "tokio"))]
    Disabled,
}

impl Socket {
    /// Connect the transport selected by the connection options.
    pub async fn connect(opt: &ConnectOptions) -> io::Result<Socket> {
        match opt.schema() {
            Schema::Tcp => Self::connect_tcp(opt.host(), opt.port()).await,
            Schema::Socket => Self::connect_socket(opt.host()).await,
        }
    }

    pub async fn connect_tcp(host: &str, port: u16) -> io::Result<Socket> {
        #[cfg(feature = "tokio")]
        {
            let socket = tokio::net::TcpStream::connect((host, port)).await?;
            socket.set_nodelay(true)?;
            crate::common::trace!("Connected via TCP Stream: {:?}", socket.local_addr());
            Ok(Socket { kind: Kind::TokioTcp(socket), open: true })
        }

        #[cfg(not(feature = "tokio"))]
        {
            let _ = (host, port);
            panic!("runtime disabled")
        }
    }

    pub async fn connect_socket(path: &str) -> io::Result<Socket> {
        #[cfg(all(feature = "tokio", unix))]
        {
            let path = if path.is_empty() {
                warning!("Socket path is empty. Trying default");
                DEFAULT_SOCKET_PATH
            } else {
                path
            };
            let socket = tokio::net::UnixStream::connect(path).await?;
            crate::common::trace!("Connected via Unix socket: {path:?}");
            Ok(Socket { kind: Kind::TokioUnixSocket(socket), open: true })
        }

        #[cfg(not(all(feature = "tokio", unix)))]
        {
            let _ = path;
            panic!("runtime disabled")
        }
    }
}

impl Transport for Socket {
    fn poll_read(&mut self, cx: &mut Context, buf: &mut BytesMut) -> Poll<io::Result<usize>> {
        match &mut self.kind {
            #[cfg(feature = "tokio")]
            Kind::TokioTcp(t) => poll_read(t, buf, cx),
            #[cfg(all(feature = "tokio", unix))]
            Kind::TokioUnixSocket(u) => poll_read(u, buf, cx),
            #[cfg(not(feature = "tokio"))]
            Kind::Disabled => {
                let _ = (cx, buf);
                panic!("runtime disabled")
            },
        }
    }

    fn poll_write(&mut self, cx: &mut Context, buf: &mut BytesMut) -> Poll<io::Result<()>> {
        match &mut self.kind {
            #[cfg(feature = "tokio")]
            Kind::TokioTcp(t) => poll_write_all(t, buf, cx),
            #[cfg(all(feature = "tokio", unix))]
            Kind::TokioUnixSocket(u) => poll_write_all(u, buf, cx),
            #[cfg(not(feature = "tokio"))]
            Kind::Disabled => {
                let _ = (cx, buf);
                panic!("runtime disabled")
            },
        }
    }

    fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        let poll = match &mut self.kind {
            #[cfg(feature = "tokio")]
            Kind::TokioTcp(t) => {
                tokio::io::AsyncWrite::poll_shutdown(std::pin::Pin::new(t), cx)
            },
            #[cfg(all(feature = "tokio", unix))]
            Kind::TokioUnixSocket(u) => {
                tokio::io::AsyncWrite::poll_shutdown(std::pin::Pin::new(u), cx)
            },
            #[cfg(not(feature = "tokio"))]
            Kind::Disabled => {
                let _ = cx;
                panic!("runtime disabled")
            },
        };
        if let Poll::Ready(Ok(())) = &poll {
            self.open = false;
        }
        poll
    }

    fn is_connected(&self) -> bool {
        self.open
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, _f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            #[cfg(feature = "tokio")]
            Kind::TokioTcp(ref tcp) => std::fmt::Debug::fmt(tcp, _f),
            #[cfg(all(feature = "tokio", unix))]
            Kind::TokioUnixSocket(ref unix) => std::fmt::Debug::fmt(&unix, _f),
            #[cfg(not(feature = "tokio"))]
            Kind::Disabled => _f.write_str("Socket(disabled)"),
        }
    }
}

#[cfg(feature = "tokio")]
fn poll_read<R>(reader: &mut R, buf: &mut BytesMut, cx: &mut Context) -> Poll<io::Result<usize>>
where
    R: tokio::io::AsyncRead + Unpin + ?Sized,
{
    use bytes::BufMut;
    use std::{pin::Pin, task::ready};
    use tokio::io::ReadBuf;

    if !buf.has_remaining_mut() {
        return Poll::Ready(Ok(0));
    }

    let n = {
        let dst = buf.chunk_mut();
        let dst = unsafe { dst.as_uninit_slice_mut() };
        let mut buf = ReadBuf::uninit(dst);
        let ptr = buf.filled().as_ptr();
        ready!(Pin::new(reader).poll_read(cx, &mut buf)?);

        // Ensure the pointer does not change from under us
        assert_eq!(ptr, buf.filled().as_ptr());
        buf.filled().len()
    };

    // Safety: This is guaranteed to be the number of initialized (and read)
    // bytes due to the invariants provided by `ReadBuf::filled`.
    unsafe {
        buf.advance_mut(n);
    }

    Poll::Ready(Ok(n))
}

#[cfg(feature = "tokio")]
fn poll_write_all<W>(writer: &mut W, buf: &mut BytesMut, cx: &mut Context) -> Poll<io::Result<()>>
where
    W: tokio::io::AsyncWrite + Unpin + ?Sized,
{
    use bytes::Buf;
    use std::{pin::Pin, task::ready};

    while buf.has_remaining() {
        let n = ready!(Pin::new(&mut *writer).poll_write(cx, buf.chunk())?);
        buf.advance(n);
        if n == 0 {
            return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
        }
    }

    Poll::Ready(Ok(()))
}
