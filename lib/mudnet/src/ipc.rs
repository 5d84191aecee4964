//! Framed packet channel between one worker and the master.
//!
//! The transport is a connected `UnixDatagram` pair, a portable fallback
//! every POSIX host supports. Datagram sockets already preserve message
//! boundaries at the OS level, so unlike [`crate::buffer::Buffer`]-backed
//! stream channels there is no byte-stream reassembly to do here -- one
//! `send_to`/`recv_from` call is exactly one packet.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flux::shared::{ErrorType, NetworkError, NetworkResult, MSG_MAX};
use mio_uds::UnixDatagram;
use std::io::{self, Cursor, Write};

/// Request code reserved by the transport itself (rather than by the
/// request table in `gamecore`) for splitting oversized broadcasts.
pub const BCASTMSG: u8 = 0;
/// Request code reserved for the completion marker.
pub const ALLDONE: u8 = 1;

/// Minimum size of a worker->master packet: an 8-byte sender id plus a 1-byte
/// command. Anything shorter is dropped and treated as a disconnect.
const WORKER_HEADER_LEN: usize = 8 + 1;
const MASTER_HEADER_LEN: usize = 1;

/// A decoded worker->master packet.
#[derive(Debug, Clone)]
pub struct WorkerPacket {
    pub sender_id: u64,
    pub cmd: u8,
    pub payload: Vec<u8>,
}

/// A decoded master->worker packet.
#[derive(Debug, Clone)]
pub struct MasterPacket {
    pub cmd: u8,
    pub payload: Vec<u8>,
}

impl WorkerPacket {
    pub fn new(sender_id: u64, cmd: u8, payload: Vec<u8>) -> WorkerPacket {
        WorkerPacket { sender_id, cmd, payload }
    }

    fn encode(&self) -> NetworkResult<Vec<u8>> {
        let total = WORKER_HEADER_LEN + self.payload.len();
        if total > MSG_MAX {
            return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
        }

        let mut buf = Vec::with_capacity(total);
        buf.write_u64::<BigEndian>(self.sender_id)
            .map_err(|_| NetworkError::Fatal(ErrorType::Serialization))?;
        buf.write_u8(self.cmd)
            .map_err(|_| NetworkError::Fatal(ErrorType::Serialization))?;
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a raw datagram. A packet shorter than the sender-id+cmd width
    /// is treated as a peer disconnect.
    fn decode(raw: &[u8]) -> NetworkResult<WorkerPacket> {
        if raw.len() < WORKER_HEADER_LEN {
            return Err(NetworkError::Fatal(ErrorType::EmptyPayload));
        }

        let mut cursor = Cursor::new(raw);
        let sender_id = cursor
            .read_u64::<BigEndian>()
            .map_err(|_| NetworkError::Fatal(ErrorType::Serialization))?;
        let cmd = cursor
            .read_u8()
            .map_err(|_| NetworkError::Fatal(ErrorType::Serialization))?;
        let payload = raw[WORKER_HEADER_LEN..].to_vec();

        Ok(WorkerPacket { sender_id, cmd, payload })
    }
}

impl MasterPacket {
    pub fn new(cmd: u8, payload: Vec<u8>) -> MasterPacket {
        MasterPacket { cmd, payload }
    }

    fn encode(&self) -> NetworkResult<Vec<u8>> {
        let total = MASTER_HEADER_LEN + self.payload.len();
        if total > MSG_MAX {
            return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
        }

        let mut buf = Vec::with_capacity(total);
        buf.write_u8(self.cmd)
            .map_err(|_| NetworkError::Fatal(ErrorType::Serialization))?;
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    fn decode(raw: &[u8]) -> NetworkResult<MasterPacket> {
        if raw.len() < MASTER_HEADER_LEN {
            return Err(NetworkError::Fatal(ErrorType::EmptyPayload));
        }

        Ok(MasterPacket { cmd: raw[0], payload: raw[1..].to_vec() })
    }
}

/// Splits an oversized `BCASTMSG` payload into chunks that individually fit
/// inside `MSG_MAX - MASTER_HEADER_LEN` bytes.
pub fn split_broadcast(payload: &[u8]) -> impl Iterator<Item = &[u8]> {
    payload.chunks(MSG_MAX - MASTER_HEADER_LEN)
}

/// One end of a worker<->master channel. Both the master's and the worker's
/// sides use the same type -- the connected `UnixDatagram` pair is symmetric,
/// only the packet shapes sent over it differ by direction.
pub struct Channel {
    socket: UnixDatagram,
    recv_buf: [u8; MSG_MAX],
}

impl Channel {
    /// Creates a connected, non-blocking pair of channel endpoints: `(master_side, worker_side)`.
    pub fn pair() -> io::Result<(Channel, Channel)> {
        let (a, b) = UnixDatagram::pair()?;
        Ok((Channel::from_socket(a), Channel::from_socket(b)))
    }

    fn from_socket(socket: UnixDatagram) -> Channel {
        Channel { socket, recv_buf: [0u8; MSG_MAX] }
    }

    #[inline]
    pub fn socket(&self) -> &UnixDatagram {
        &self.socket
    }

    /// Sends a worker->master packet. Retries are the caller's responsibility:
    /// a `NetworkError::Wait` means "try again once the socket is writable".
    pub fn send_worker_packet(&self, packet: &WorkerPacket) -> NetworkResult<()> {
        self.send_raw(&packet.encode()?)
    }

    pub fn send_master_packet(&self, packet: &MasterPacket) -> NetworkResult<()> {
        self.send_raw(&packet.encode()?)
    }

    fn send_raw(&self, buf: &[u8]) -> NetworkResult<()> {
        loop {
            match self.socket.send(buf) {
                Ok(_) => return Ok(()),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return Err(NetworkError::Wait)
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Reads one pending worker->master packet, if any.
    pub fn recv_worker_packet(&mut self) -> NetworkResult<WorkerPacket> {
        let n = self.recv_raw()?;
        WorkerPacket::decode(&self.recv_buf[..n])
    }

    pub fn recv_master_packet(&mut self) -> NetworkResult<MasterPacket> {
        let n = self.recv_raw()?;
        MasterPacket::decode(&self.recv_buf[..n])
    }

    fn recv_raw(&mut self) -> NetworkResult<usize> {
        match self.socket.recv(&mut self.recv_buf) {
            Ok(n) => Ok(n),
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => Err(NetworkError::Wait),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_packet_roundtrip() {
        let (master_side, worker_side) = Channel::pair().unwrap();

        let packet = WorkerPacket::new(42, 7, b"go north".to_vec());
        worker_side.send_worker_packet(&packet).unwrap();

        let mut master_side = master_side;
        let decoded = master_side.recv_worker_packet().unwrap();
        assert_eq!(decoded.sender_id, 42);
        assert_eq!(decoded.cmd, 7);
        assert_eq!(decoded.payload, b"go north");
    }

    #[test]
    fn master_packet_roundtrip() {
        let (master_side, worker_side) = Channel::pair().unwrap();

        let packet = MasterPacket::new(ALLDONE, vec![]);
        master_side.send_master_packet(&packet).unwrap();

        let mut worker_side = worker_side;
        let decoded = worker_side.recv_master_packet().unwrap();
        assert_eq!(decoded.cmd, ALLDONE);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn recv_without_data_waits() {
        let (mut master_side, _worker_side) = Channel::pair().unwrap();
        assert_eq!(master_side.recv_worker_packet().unwrap_err(), NetworkError::Wait);
    }

    #[test]
    fn short_packet_is_empty_payload_error() {
        let (master_side, worker_side) = Channel::pair().unwrap();
        worker_side.socket.send(&[1, 2, 3]).unwrap();

        let mut master_side = master_side;
        let err = master_side.recv_worker_packet().unwrap_err();
        assert_eq!(err, NetworkError::Fatal(ErrorType::EmptyPayload));
    }

    #[test]
    fn split_broadcast_chunks_to_fit() {
        let payload = vec![7u8; MSG_MAX * 3];
        let chunks: Vec<_> = split_broadcast(&payload).collect();
        assert!(chunks.iter().all(|c| c.len() <= MSG_MAX - MASTER_HEADER_LEN));
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), payload.len());
    }
}
