//! Backing-store protocol
//!
//! The seam between the engine and persistence. A store only ever sees
//! opaque [`DataBlock`]s; transactions, indices, and query semantics
//! never cross this boundary, so any ordered block container (an
//! in-memory list, RocksDB, a remote document store) can back a space.
//!
//! Reads: [`BlockStore::source`] starts a fresh producer task per call,
//! emitting blocks in storage order into a bounded channel. Errors are
//! reported only through the completion signal, after the stream is
//! drained. Dropping a [`BlockSource`] cancels its producer.
//!
//! Writes: one shared [`BlockStore::sink`] channel, consumed by a
//! single writer task per store. The caller must await each write's
//! acknowledgment before issuing the next one, so the store observes a
//! total order of block mutations at the cost of one round-trip per
//! block.

use crate::block::{BlockKey, DataBlock};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Bounded hand-off depth for block scan channels.
pub(crate) const SCAN_CHANNEL_CAPACITY: usize = 16;

/// One block write request.
///
/// A block with `key == BlockKey::New` is stored fresh and the
/// acknowledgment carries the assigned key; `BlockKey::Existing`
/// overwrites the stored block under that id.
#[derive(Debug)]
pub struct BlockWrite {
    /// The block to persist.
    pub block: DataBlock,
    /// Acknowledgment slot; carries the assigned key or the write error.
    pub ack: oneshot::Sender<Result<BlockKey>>,
}

/// An in-flight ordered scan of all blocks in a store.
#[derive(Debug)]
pub struct BlockSource {
    rx: mpsc::Receiver<DataBlock>,
    done: oneshot::Receiver<Result<()>>,
}

impl BlockSource {
    /// Pair a scan channel with its completion signal.
    pub fn new(rx: mpsc::Receiver<DataBlock>, done: oneshot::Receiver<Result<()>>) -> Self {
        Self { rx, done }
    }

    /// Next block in storage order, or `None` when the scan is done.
    pub async fn next(&mut self) -> Option<DataBlock> {
        self.rx.recv().await
    }

    /// The scan result. Call after `next` has returned `None`; carries
    /// the first error the producer encountered, if any.
    pub async fn finish(self) -> Result<()> {
        drop(self.rx);
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(Error::Channel(
                "scan task exited without reporting completion".to_string(),
            )),
        }
    }
}

/// Minimal streaming read / sequential write contract every block
/// persistence mechanism implements.
pub trait BlockStore: Send + Sync {
    /// Begin a fresh, independent scan of all blocks in storage order.
    fn source(&self) -> BlockSource;

    /// The store's shared write channel. At most one write may be in
    /// flight: send a [`BlockWrite`] and await its acknowledgment
    /// before the next send.
    fn sink(&self) -> mpsc::Sender<BlockWrite>;
}

/// Write one block through a sink and await the acknowledgment.
pub async fn put_block(sink: &mpsc::Sender<BlockWrite>, block: DataBlock) -> Result<BlockKey> {
    let (ack, ack_rx) = oneshot::channel();
    sink.send(BlockWrite { block, ack })
        .await
        .map_err(|_| Error::Channel("store writer task is gone".to_string()))?;
    ack_rx
        .await
        .map_err(|_| Error::Channel("store dropped the write acknowledgment".to_string()))?
}

/// In-memory block store: blocks live in a vector, keys are vector
/// indices. Reference implementation of the protocol and the test
/// double for the RocksDB store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    blocks: Arc<RwLock<Vec<DataBlock>>>,
    sink: mpsc::Sender<BlockWrite>,
}

impl MemoryStore {
    /// Create an empty store and spawn its writer task. Must be called
    /// from within a tokio runtime.
    pub fn new() -> Self {
        let blocks = Arc::new(RwLock::new(Vec::new()));
        let writer_blocks = Arc::clone(&blocks);
        let (sink, mut rx) = mpsc::channel::<BlockWrite>(1);
        tokio::spawn(async move {
            while let Some(BlockWrite { mut block, ack }) = rx.recv().await {
                let result = {
                    let mut blocks = writer_blocks.write();
                    match block.key {
                        BlockKey::New => {
                            let id = blocks.len() as u64;
                            block.key = BlockKey::Existing(id);
                            blocks.push(block);
                            Ok(BlockKey::Existing(id))
                        }
                        BlockKey::Existing(id) => {
                            if (id as usize) < blocks.len() {
                                blocks[id as usize] = block;
                                Ok(BlockKey::Existing(id))
                            } else {
                                Err(Error::Storage(format!("unknown block key {}", id)))
                            }
                        }
                    }
                };
                let _ = ack.send(result);
            }
        });
        Self { blocks, sink }
    }

    /// Number of stored blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for MemoryStore {
    fn source(&self) -> BlockSource {
        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let (done_tx, done_rx) = oneshot::channel();
        // A scan observes the blocks that existed when it started.
        let snapshot: Vec<DataBlock> = self.blocks.read().clone();
        tokio::spawn(async move {
            for block in snapshot {
                if tx.send(block).await.is_err() {
                    // Consumer dropped the scan.
                    return;
                }
            }
            let _ = done_tx.send(Ok(()));
        });
        BlockSource::new(rx, done_rx)
    }

    fn sink(&self) -> mpsc::Sender<BlockWrite> {
        self.sink.clone()
    }
}
