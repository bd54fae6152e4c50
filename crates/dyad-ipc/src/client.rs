//! Blocking broker client.
//!
//! The client runs on the application's own thread inside intercepted
//! open/close calls, so everything here is synchronous: one request frame
//! out, one reply frame back. Wait-create lookups and barriers simply block
//! on the reply, which matches the native contract of the calls the shim is
//! standing in for.

use std::io::Read;
use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::debug;

use crate::{read_frame, write_frame, BrokerRequest, BrokerResponse, IpcError, KvsTxn};

pub struct BrokerClient {
    stream: UnixStream,
    rank: u32,
}

impl BrokerClient {
    /// Connect and handshake. The broker assigns the rank; the caller never
    /// guesses it from the environment.
    pub fn connect(socket_path: &Path) -> Result<Self, IpcError> {
        let mut stream = UnixStream::connect(socket_path)?;
        write_frame(
            &mut stream,
            &BrokerRequest::Hello {
                client_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        )?;
        match read_frame(&mut stream)? {
            BrokerResponse::HelloAck {
                rank,
                broker_version,
            } => {
                debug!(rank, version = %broker_version, "broker handshake complete");
                Ok(Self { stream, rank })
            }
            BrokerResponse::Error(e) => Err(IpcError::Broker(e)),
            _ => Err(IpcError::UnexpectedReply("Hello")),
        }
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// Commit a packed transaction and wait for it to be durable.
    pub fn kvs_commit(
        &mut self,
        namespace: Option<&str>,
        txn: KvsTxn,
    ) -> Result<(), IpcError> {
        write_frame(
            &mut self.stream,
            &BrokerRequest::KvsCommit {
                namespace: namespace.map(str::to_string),
                txn,
            },
        )?;
        match read_frame(&mut self.stream)? {
            BrokerResponse::CommitAck => Ok(()),
            BrokerResponse::Error(e) => Err(IpcError::Broker(e)),
            _ => Err(IpcError::UnexpectedReply("KvsCommit")),
        }
    }

    /// Wait-create lookup: blocks, with no timeout, until the key exists.
    pub fn kvs_lookup_wait(
        &mut self,
        namespace: Option<&str>,
        key: &str,
    ) -> Result<u32, IpcError> {
        eprintln!("DEBUG client: sending KvsLookupWait");
        write_frame(
            &mut self.stream,
            &BrokerRequest::KvsLookupWait {
                namespace: namespace.map(str::to_string),
                key: key.to_string(),
            },
        )?;
        eprintln!("DEBUG client: sent, reading reply");
        let reply = read_frame(&mut self.stream)?;
        eprintln!("DEBUG client: got reply");
        match reply {
            BrokerResponse::LookupValue { rank } => Ok(rank),
            BrokerResponse::Error(e) => Err(IpcError::Broker(e)),
            _ => Err(IpcError::UnexpectedReply("KvsLookupWait")),
        }
    }

    /// Fetch a produced file from its owner rank. Returns the raw bytes.
    ///
    /// The payload is borrowed from the stream into an owned buffer before
    /// this call returns, so the caller is free to hold it across further
    /// requests.
    pub fn fetch(&mut self, owner: u32, upath: &str) -> Result<Vec<u8>, IpcError> {
        write_frame(
            &mut self.stream,
            &BrokerRequest::Fetch {
                owner,
                upath: upath.to_string(),
            },
        )?;
        match read_frame(&mut self.stream)? {
            BrokerResponse::FetchData { len } => {
                let mut data = vec![0u8; len as usize];
                self.stream.read_exact(&mut data)?;
                debug!(upath, len, "fetched file payload");
                Ok(data)
            }
            BrokerResponse::Error(e) => Err(IpcError::Broker(e)),
            _ => Err(IpcError::UnexpectedReply("Fetch")),
        }
    }

    /// Join the named barrier and block until `nprocs` participants arrive.
    pub fn barrier(&mut self, name: &str, nprocs: u32) -> Result<(), IpcError> {
        write_frame(
            &mut self.stream,
            &BrokerRequest::Barrier {
                name: name.to_string(),
                nprocs,
            },
        )?;
        match read_frame(&mut self.stream)? {
            BrokerResponse::BarrierAck => Ok(()),
            BrokerResponse::Error(e) => Err(IpcError::Broker(e)),
            _ => Err(IpcError::UnexpectedReply("Barrier")),
        }
    }
}
