//! TCP 传输：按截止时间读取完整 RTDE 帧

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, trace};
use urcell_protocol::{Frame, FrameDecoder};

use crate::RtdeError;

const READ_CHUNK: usize = 4096;

/// 单个 TCP 连接 + 流式帧解码器
pub(crate) struct Transport {
    stream: TcpStream,
    decoder: FrameDecoder,
    chunk: Box<[u8; READ_CHUNK]>,
}

impl Transport {
    /// 依次尝试解析出的每个地址，返回第一个成功的连接
    pub(crate) fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, RtdeError> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!("RTDE transport connected to {}", addr);
                    return Ok(Self::from_stream(stream));
                },
                Err(e) => {
                    trace!("connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                },
            }
        }
        Err(RtdeError::Connection(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{host}:{port} did not resolve to any address"),
            )
        })))
    }

    pub(crate) fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(),
            chunk: Box::new([0u8; READ_CHUNK]),
        }
    }

    pub(crate) fn write_frame(&mut self, frame: &[u8]) -> Result<(), RtdeError> {
        self.stream.write_all(frame).map_err(map_io)
    }

    /// 读取下一帧，最多等到 `deadline`
    ///
    /// # 错误
    /// - `Timeout`: 截止时间前没有完整帧
    /// - `Closed`: 对端关闭连接
    /// - `Protocol`: 帧头非法
    pub(crate) fn read_frame(&mut self, deadline: Instant) -> Result<Frame, RtdeError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(frame);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RtdeError::Timeout);
            }
            self.stream.set_read_timeout(Some(remaining))?;

            match self.stream.read(&mut self.chunk[..]) {
                Ok(0) => return Err(RtdeError::Closed),
                Ok(n) => self.decoder.extend(&self.chunk[..n]),
                Err(e) if is_timeout(&e) => return Err(RtdeError::Timeout),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io(e)),
            }
        }
    }

    /// 返回已经到达的下一帧，不阻塞
    ///
    /// 先消费缓冲区，缓冲区不足时做一次非阻塞读取。
    pub(crate) fn poll_frame(&mut self) -> Result<Option<Frame>, RtdeError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }

            self.stream.set_nonblocking(true)?;
            let read = self.stream.read(&mut self.chunk[..]);
            self.stream.set_nonblocking(false)?;

            match read {
                Ok(0) => return Err(RtdeError::Closed),
                Ok(n) => self.decoder.extend(&self.chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io(e)),
            }
        }
    }

    pub(crate) fn shutdown(&mut self) {
        // 对端可能已经关闭
        let _ = self.stream.shutdown(Shutdown::Both);
        self.decoder.clear();
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// 对端复位与正常关闭同样视为 `Closed`
fn map_io(e: io::Error) -> RtdeError {
    match e.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => RtdeError::Closed,
        _ => RtdeError::Connection(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    use urcell_protocol::{ControllerMessage, MessageType};

    fn pair() -> (Transport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (Transport::from_stream(client.join().unwrap()), server)
    }

    #[test]
    fn test_read_frame_reassembles_split_writes() {
        let (mut transport, mut server) = pair();
        let bytes = ControllerMessage::Start { accepted: true }.encode().unwrap();

        server.write_all(&bytes[..2]).unwrap();
        server.flush().unwrap();
        thread::sleep(Duration::from_millis(20));
        server.write_all(&bytes[2..]).unwrap();

        let frame = transport
            .read_frame(Instant::now() + Duration::from_secs(1))
            .unwrap();
        assert_eq!(frame.msg_type().unwrap(), MessageType::ControlPackageStart);
    }

    #[test]
    fn test_read_frame_times_out() {
        let (mut transport, _server) = pair();
        let start = Instant::now();
        let err = transport
            .read_frame(Instant::now() + Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, RtdeError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_peer_close_is_reported_as_closed() {
        let (mut transport, server) = pair();
        drop(server);
        let err = transport
            .read_frame(Instant::now() + Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, RtdeError::Closed));
    }

    #[test]
    fn test_poll_frame_does_not_block() {
        let (mut transport, mut server) = pair();
        assert!(transport.poll_frame().unwrap().is_none());

        let bytes = ControllerMessage::Pause { accepted: true }.encode().unwrap();
        server.write_all(&bytes).unwrap();
        thread::sleep(Duration::from_millis(20));
        let frame = transport.poll_frame().unwrap().unwrap();
        assert_eq!(frame.msg_type().unwrap(), MessageType::ControlPackagePause);
    }
}
