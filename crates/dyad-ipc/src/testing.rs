//! In-process broker for integration tests.
//!
//! Spins up one Unix-socket listener per simulated rank, all sharing a
//! [`BrokerNet`]: a common KVS with wait-create semantics, named barriers,
//! and a per-rank storage root used to serve fetch requests in place of the
//! producer-side fetch handler. The net counts fetches so tests can assert
//! that the shared-storage and self-ownership short-circuits never touch
//! the wire.

use std::collections::HashMap;
use std::io::Write;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::{read_frame, write_frame, BrokerRequest, BrokerResponse, IpcError};

#[derive(Default)]
struct BarrierState {
    arrived: u32,
    released: bool,
}

/// Shared state behind every [`TestBroker`] of one simulated job.
pub struct BrokerNet {
    kvs: Mutex<HashMap<String, u32>>,
    kvs_cond: Condvar,
    barriers: Mutex<HashMap<String, BarrierState>>,
    barrier_cond: Condvar,
    roots: Mutex<HashMap<u32, PathBuf>>,
    fetches: AtomicUsize,
    drop_fetches: AtomicBool,
}

impl BrokerNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            kvs: Mutex::new(HashMap::new()),
            kvs_cond: Condvar::new(),
            barriers: Mutex::new(HashMap::new()),
            barrier_cond: Condvar::new(),
            roots: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
            drop_fetches: AtomicBool::new(false),
        })
    }

    /// Directory a rank serves fetch requests from (its managed dir in a
    /// real deployment).
    pub fn set_rank_root(&self, rank: u32, root: impl Into<PathBuf>) {
        self.roots.lock().unwrap().insert(rank, root.into());
    }

    /// Number of fetch RPCs that reached the net.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Make every subsequent fetch close the stream without replying,
    /// simulating an end-of-stream before any data.
    pub fn drop_fetches(&self, on: bool) {
        self.drop_fetches.store(on, Ordering::SeqCst);
    }

    /// Direct KVS read, bypassing wait-create. For test assertions only.
    pub fn kvs_peek(&self, namespace: Option<&str>, key: &str) -> Option<u32> {
        self.kvs
            .lock()
            .unwrap()
            .get(&scoped_key(namespace, key))
            .copied()
    }

    fn commit(&self, namespace: Option<&str>, entries: &[crate::KvsEntry]) {
        let mut kvs = self.kvs.lock().unwrap();
        for e in entries {
            kvs.insert(scoped_key(namespace, &e.key), e.rank);
        }
        self.kvs_cond.notify_all();
    }

    fn lookup_wait(&self, namespace: Option<&str>, key: &str) -> u32 {
        let scoped = scoped_key(namespace, key);
        let mut kvs = self.kvs.lock().unwrap();
        loop {
            if let Some(rank) = kvs.get(&scoped) {
                return *rank;
            }
            kvs = self.kvs_cond.wait(kvs).unwrap();
        }
    }

    fn barrier(&self, name: &str, nprocs: u32) {
        let mut barriers = self.barriers.lock().unwrap();
        let state = barriers.entry(name.to_string()).or_default();
        state.arrived += 1;
        if state.arrived >= nprocs {
            state.released = true;
            self.barrier_cond.notify_all();
            return;
        }
        while !barriers.get(name).map(|s| s.released).unwrap_or(true) {
            barriers = self.barrier_cond.wait(barriers).unwrap();
        }
    }

    fn read_owned_file(&self, owner: u32, upath: &str) -> std::io::Result<Vec<u8>> {
        let root = self
            .roots
            .lock()
            .unwrap()
            .get(&owner)
            .cloned()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no storage root registered for rank {owner}"),
                )
            })?;
        std::fs::read(root.join(upath))
    }
}

fn scoped_key(namespace: Option<&str>, key: &str) -> String {
    format!("{}:{}", namespace.unwrap_or("default"), key)
}

/// One simulated rank's broker endpoint.
pub struct TestBroker {
    shutdown: Arc<AtomicBool>,
    socket_path: PathBuf,
    accept_thread: Option<JoinHandle<()>>,
}

impl TestBroker {
    pub fn spawn(
        socket_path: impl Into<PathBuf>,
        rank: u32,
        net: Arc<BrokerNet>,
    ) -> std::io::Result<Self> {
        let socket_path = socket_path.into();
        let listener = UnixListener::bind(&socket_path)?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let accept_shutdown = Arc::clone(&shutdown);
        let accept_thread = std::thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { break };
                let net = Arc::clone(&net);
                std::thread::spawn(move || serve_connection(stream, rank, &net));
            }
        });
        Ok(Self {
            shutdown,
            socket_path,
            accept_thread: Some(accept_thread),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Nudge the accept loop out of its blocking accept.
        let _ = UnixStream::connect(&self.socket_path);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

fn serve_connection(mut stream: UnixStream, rank: u32, net: &BrokerNet) {
    loop {
        let request: BrokerRequest = match read_frame(&mut stream) {
            Ok(r) => r,
            Err(IpcError::Finished) => return,
            Err(_) => return,
        };
        let sent = match request {
            BrokerRequest::Hello { .. } => write_frame(
                &mut stream,
                &BrokerResponse::HelloAck {
                    rank,
                    broker_version: env!("CARGO_PKG_VERSION").to_string(),
                },
            ),
            BrokerRequest::KvsCommit { namespace, txn } => {
                net.commit(namespace.as_deref(), txn.entries());
                write_frame(&mut stream, &BrokerResponse::CommitAck)
            }
            BrokerRequest::KvsLookupWait { namespace, key } => {
                let owner = net.lookup_wait(namespace.as_deref(), &key);
                write_frame(&mut stream, &BrokerResponse::LookupValue { rank: owner })
            }
            BrokerRequest::Fetch { owner, upath } => {
                net.fetches.fetch_add(1, Ordering::SeqCst);
                if net.drop_fetches.load(Ordering::SeqCst) {
                    return;
                }
                match net.read_owned_file(owner, &upath) {
                    Ok(data) => {
                        let header = write_frame(
                            &mut stream,
                            &BrokerResponse::FetchData {
                                len: data.len() as u64,
                            },
                        );
                        header.and_then(|()| {
                            stream.write_all(&data).map_err(IpcError::Io)
                        })
                    }
                    Err(e) => write_frame(
                        &mut stream,
                        &BrokerResponse::Error(format!("fetch of {upath} failed: {e}")),
                    ),
                }
            }
            BrokerRequest::Barrier { name, nprocs } => {
                net.barrier(&name, nprocs);
                write_frame(&mut stream, &BrokerResponse::BarrierAck)
            }
        };
        if sent.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BrokerClient;
    use std::time::Duration;

    fn net_with_broker(rank: u32) -> (tempfile::TempDir, Arc<BrokerNet>, TestBroker) {
        let dir = tempfile::tempdir().unwrap();
        let net = BrokerNet::new();
        let broker =
            TestBroker::spawn(dir.path().join("broker.sock"), rank, Arc::clone(&net)).unwrap();
        (dir, net, broker)
    }

    #[test]
    fn test_handshake_reports_rank() {
        let (_dir, _net, broker) = net_with_broker(7);
        let client = BrokerClient::connect(broker.socket_path()).unwrap();
        assert_eq!(client.rank(), 7);
    }

    #[test]
    fn test_commit_then_lookup() {
        let (_dir, _net, broker) = net_with_broker(0);
        let mut client = BrokerClient::connect(broker.socket_path()).unwrap();
        let mut txn = crate::KvsTxn::new();
        txn.put("1a.2b.3c.file.dat", 0);
        client.kvs_commit(None, txn).unwrap();
        assert_eq!(client.kvs_lookup_wait(None, "1a.2b.3c.file.dat").unwrap(), 0);
    }

    #[test]
    fn test_lookup_blocks_until_commit() {
        let (_dir, net, broker) = net_with_broker(0);
        let socket = broker.socket_path().to_path_buf();
        let waiter = std::thread::spawn(move || {
            let mut client = BrokerClient::connect(&socket).unwrap();
            client.kvs_lookup_wait(None, "k").unwrap()
        });
        std::thread::sleep(Duration::from_millis(100));
        assert!(!waiter.is_finished());
        net.commit(None, &[crate::KvsEntry {
            key: "k".to_string(),
            rank: 3,
        }]);
        assert_eq!(waiter.join().unwrap(), 3);
    }

    #[test]
    fn test_namespaces_are_disjoint() {
        let (_dir, net, broker) = net_with_broker(0);
        let mut client = BrokerClient::connect(broker.socket_path()).unwrap();
        let mut txn = crate::KvsTxn::new();
        txn.put("k", 1);
        client.kvs_commit(Some("a"), txn).unwrap();
        assert_eq!(net.kvs_peek(Some("a"), "k"), Some(1));
        assert_eq!(net.kvs_peek(Some("b"), "k"), None);
        assert_eq!(net.kvs_peek(None, "k"), None);
    }

    #[test]
    fn test_fetch_returns_file_bytes() {
        let (dir, net, broker) = net_with_broker(1);
        let root = dir.path().join("rank0");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("sub/data.bin"), b"payload").unwrap();
        net.set_rank_root(0, &root);

        let mut client = BrokerClient::connect(broker.socket_path()).unwrap();
        let data = client.fetch(0, "sub/data.bin").unwrap();
        assert_eq!(data, b"payload");
        assert_eq!(net.fetch_count(), 1);
    }

    #[test]
    fn test_fetch_missing_file_is_broker_error() {
        let (dir, net, broker) = net_with_broker(1);
        net.set_rank_root(0, dir.path());
        let mut client = BrokerClient::connect(broker.socket_path()).unwrap();
        let err = client.fetch(0, "absent.bin").unwrap_err();
        assert!(matches!(err, IpcError::Broker(_)));
    }

    #[test]
    fn test_dropped_fetch_is_finished() {
        let (dir, net, broker) = net_with_broker(1);
        net.set_rank_root(0, dir.path());
        net.drop_fetches(true);
        let mut client = BrokerClient::connect(broker.socket_path()).unwrap();
        let err = client.fetch(0, "anything").unwrap_err();
        assert!(matches!(err, IpcError::Finished));
    }

    #[test]
    fn test_barrier_releases_all_parties() {
        let (_dir, net, broker) = net_with_broker(0);
        let socket = broker.socket_path().to_path_buf();
        let other = std::thread::spawn(move || {
            let mut client = BrokerClient::connect(&socket).unwrap();
            client.barrier("sync_start", 2).unwrap();
        });
        std::thread::sleep(Duration::from_millis(50));
        assert!(!other.is_finished());
        let mut client = BrokerClient::connect(broker.socket_path()).unwrap();
        client.barrier("sync_start", 2).unwrap();
        other.join().unwrap();
        let _ = net;
    }
}
