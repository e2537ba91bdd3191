//! RocksDB-backed block store
//!
//! Blocks are persisted bincode-encoded, one opaque value per block,
//! under big-endian u64 keys in a `blocks` column family so that key
//! order is storage order. The writer task owns the key counter; `New`
//! writes get the next sequential key, `Existing` writes overwrite.

use crate::block::{BlockKey, DataBlock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{BlockSource, BlockStore, BlockWrite, SCAN_CHANNEL_CAPACITY};
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

const CF_BLOCKS: &str = "blocks";

/// Blocks fetched per RocksDB iterator pass during a scan. The
/// iterator is re-seeked between batches so it is never held across an
/// await point.
const SCAN_BATCH: usize = 8;

/// Durable block store on RocksDB.
pub struct RocksStore {
    db: Arc<DB>,
    sink: mpsc::Sender<BlockWrite>,
}

impl RocksStore {
    /// Open or create the database under `config.data_dir` and spawn
    /// the writer task. Must be called from within a tokio runtime.
    pub fn open(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let mut cf_opts = Options::default();
        cf_opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        let cf_descriptors = vec![ColumnFamilyDescriptor::new(CF_BLOCKS, cf_opts)];

        let db = Arc::new(DB::open_cf_descriptors(
            &db_opts,
            &config.data_dir,
            cf_descriptors,
        )?);

        let next_key = Self::max_key(&db)?.map(|k| k + 1).unwrap_or(0);
        tracing::info!(?config.data_dir, next_key, "opened RocksDB block store");

        let sink = Self::spawn_writer(Arc::clone(&db), next_key);
        Ok(Self { db, sink })
    }

    fn cf_handle(db: &DB) -> Result<&rocksdb::ColumnFamily> {
        db.cf_handle(CF_BLOCKS)
            .ok_or_else(|| Error::Storage(format!("column family {} not found", CF_BLOCKS)))
    }

    fn max_key(db: &DB) -> Result<Option<u64>> {
        let cf = Self::cf_handle(db)?;
        for item in db.iterator_cf(cf, IteratorMode::End) {
            let (key, _) = item.map_err(Error::from)?;
            return Ok(Some(decode_key(&key)?));
        }
        Ok(None)
    }

    fn spawn_writer(db: Arc<DB>, mut next_key: u64) -> mpsc::Sender<BlockWrite> {
        let (sink, mut rx) = mpsc::channel::<BlockWrite>(1);
        tokio::spawn(async move {
            while let Some(BlockWrite { mut block, ack }) = rx.recv().await {
                let result = (|| {
                    let id = match block.key {
                        BlockKey::New => {
                            let id = next_key;
                            next_key += 1;
                            id
                        }
                        BlockKey::Existing(id) => id,
                    };
                    block.key = BlockKey::Existing(id);
                    let cf = Self::cf_handle(&db)?;
                    let value = bincode::serialize(&block)?;
                    db.put_cf(cf, id.to_be_bytes(), value)?;
                    tracing::debug!(id, transactions = block.len(), "block written");
                    Ok(BlockKey::Existing(id))
                })();
                let _ = ack.send(result);
            }
        });
        sink
    }
}

impl BlockStore for RocksStore {
    fn source(&self) -> BlockSource {
        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let (done_tx, done_rx) = oneshot::channel();
        let db = Arc::clone(&self.db);
        tokio::spawn(async move {
            let _ = done_tx.send(scan(db, tx).await);
        });
        BlockSource::new(rx, done_rx)
    }

    fn sink(&self) -> mpsc::Sender<BlockWrite> {
        self.sink.clone()
    }
}

async fn scan(db: Arc<DB>, tx: mpsc::Sender<DataBlock>) -> Result<()> {
    let mut from: u64 = 0;
    loop {
        let batch = read_batch(&db, from)?;
        let Some(&(last, _)) = batch.last() else {
            return Ok(());
        };
        for (_, block) in batch {
            if tx.send(block).await.is_err() {
                // Consumer dropped the scan.
                return Ok(());
            }
        }
        match last.checked_add(1) {
            Some(next) => from = next,
            None => return Ok(()),
        }
    }
}

fn read_batch(db: &DB, from: u64) -> Result<Vec<(u64, DataBlock)>> {
    let cf = RocksStore::cf_handle(db)?;
    let from_bytes = from.to_be_bytes();
    let mode = IteratorMode::From(&from_bytes, Direction::Forward);
    let mut batch = Vec::with_capacity(SCAN_BATCH);
    for item in db.iterator_cf(cf, mode).take(SCAN_BATCH) {
        let (key, value) = item.map_err(Error::from)?;
        let block: DataBlock = bincode::deserialize(&value)?;
        batch.push((decode_key(&key)?, block));
    }
    Ok(batch)
}

fn decode_key(key: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| Error::Storage("malformed block key".to_string()))?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::put_block;
    use crate::types::{Account, Date, Moment, Transaction};
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        (config, temp_dir)
    }

    fn block_with(moment: u64) -> DataBlock {
        let mut block = DataBlock::with_capacity(4);
        block.push(&Transaction {
            moment: Moment::new(moment),
            date: Date::new(20140501),
            entries: [(Account::new(1), 100)].into_iter().collect(),
            metadata: Vec::new(),
        });
        block
    }

    async fn drain(store: &RocksStore) -> Vec<DataBlock> {
        let mut source = store.source();
        let mut blocks = Vec::new();
        while let Some(block) = source.next().await {
            blocks.push(block);
        }
        source.finish().await.unwrap();
        blocks
    }

    #[tokio::test]
    async fn test_write_and_scan_in_key_order() {
        let (config, _temp) = test_config();
        let store = RocksStore::open(&config).unwrap();
        let sink = store.sink();

        for moment in 1..=20 {
            put_block(&sink, block_with(moment)).await.unwrap();
        }

        let blocks = drain(&store).await;
        let moments: Vec<u64> = blocks
            .iter()
            .map(|b| b.transaction(0).moment.as_u64())
            .collect();
        assert_eq!(moments, (1..=20).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_overwrite_existing_key() {
        let (config, _temp) = test_config();
        let store = RocksStore::open(&config).unwrap();
        let sink = store.sink();

        let key = put_block(&sink, block_with(1)).await.unwrap();
        let mut replacement = block_with(9);
        replacement.key = key;
        put_block(&sink, replacement).await.unwrap();

        let blocks = drain(&store).await;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].transaction(0).moment, Moment::new(9));
    }

    /// The writer task releases its DB handle asynchronously after the
    /// store is dropped, so reopening the same directory may briefly
    /// hit the RocksDB lock.
    async fn reopen(config: &Config) -> RocksStore {
        for _ in 0..100 {
            match RocksStore::open(config) {
                Ok(store) => return store,
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        }
        panic!("store did not release the database lock");
    }

    #[tokio::test]
    async fn test_reopen_continues_key_sequence() {
        let (config, _temp) = test_config();
        {
            let store = RocksStore::open(&config).unwrap();
            let sink = store.sink();
            put_block(&sink, block_with(1)).await.unwrap();
            put_block(&sink, block_with(2)).await.unwrap();
        }

        let store = reopen(&config).await;
        let sink = store.sink();
        let key = put_block(&sink, block_with(3)).await.unwrap();
        assert_eq!(key, BlockKey::Existing(2));

        let blocks = drain(&store).await;
        assert_eq!(blocks.len(), 3);
    }
}
