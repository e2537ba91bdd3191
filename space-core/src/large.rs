//! Block-paginated Space implementation
//!
//! [`LargeSpace`] lays transactions out in packed columnar
//! [`DataBlock`]s obtained lazily from a [`BlockStore`]. The three read
//! operations are all expressed through one generic block scan with a
//! per-transaction [`ScanMode`]; `append` is a per-transaction commit
//! through the store's sink.

use crate::block::{DataBlock, MAX_BLOCK_ENTRIES};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::space::{ChannelSpace, Space, TransactionStream};
use crate::store::{put_block, BlockStore};
use crate::types::{Account, Date, DateRange, Entries, Moment, MomentRange, Transaction};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Block-paginated space over a pluggable backing store.
#[derive(Clone)]
pub struct LargeSpace {
    store: Arc<dyn BlockStore>,
    capacity: usize,
}

impl LargeSpace {
    /// Bind a space to a backing store. The store may be empty ("new")
    /// or already hold blocks from a previous session.
    pub fn new(store: Arc<dyn BlockStore>, config: &Config) -> Self {
        Self {
            store,
            capacity: config.block_capacity(),
        }
    }

    /// Nominal block capacity in transactions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Find a block with room for `transaction` (linear scan of the
    /// whole store), or allocate a fresh one; push and write it back.
    /// One sink round-trip per transaction: no batching, and a failure
    /// leaves previously-written blocks durable. A transaction with
    /// more entries than one block can address is rejected.
    async fn append_one(&self, transaction: Transaction) -> Result<()> {
        let mut target: Option<DataBlock> = None;
        let mut scan = self.store.source();
        while let Some(block) = scan.next().await {
            if target.is_none() && block.has_room(transaction.entries.len(), self.capacity) {
                target = Some(block);
            }
        }
        scan.finish().await?;

        let mut block = match target {
            Some(block) => block,
            None => {
                let block = DataBlock::with_capacity(self.capacity);
                if !block.has_room(transaction.entries.len(), self.capacity) {
                    return Err(Error::TransactionTooLarge {
                        moment: transaction.moment.as_u64(),
                        entries: transaction.entries.len(),
                        limit: MAX_BLOCK_ENTRIES,
                    });
                }
                block
            }
        };
        let fresh = block.key.is_new();
        block.push(&transaction);
        let key = put_block(&self.store.sink(), block).await?;
        tracing::debug!(?key, fresh, moment = %transaction.moment, "transaction appended");
        Ok(())
    }
}

#[async_trait]
impl Space for LargeSpace {
    async fn append(&mut self, source: &dyn Space) -> Result<()> {
        let mut incoming = source.transactions();
        while let Some(transaction) = incoming.next().await {
            self.append_one(transaction).await?;
        }
        incoming.finish().await
    }

    fn slice(
        &self,
        accounts: &[Account],
        dates: &[DateRange],
        moments: &[MomentRange],
    ) -> Result<Box<dyn Space>> {
        let stream = spawn_scan(
            Arc::clone(&self.store),
            ScanMode::Slice {
                accounts: accounts.to_vec(),
                dates: dates.to_vec(),
                moments: moments.to_vec(),
            },
        );
        Ok(Box::new(ChannelSpace::new(stream)))
    }

    fn projection(
        &self,
        accounts: &[Account],
        dates: &[DateRange],
        moments: &[MomentRange],
    ) -> Result<Box<dyn Space>> {
        let stream = spawn_scan(
            Arc::clone(&self.store),
            ScanMode::Projection {
                accounts: accounts.to_vec(),
                dates: dates.to_vec(),
                moments: moments.to_vec(),
            },
        );
        Ok(Box::new(ChannelSpace::new(stream)))
    }

    fn transactions(&self) -> TransactionStream {
        spawn_scan(Arc::clone(&self.store), ScanMode::All)
    }
}

/// What a block scan does with each decoded transaction.
enum ScanMode {
    /// Emit everything in storage order.
    All,
    /// Emit whole transactions passing the filter predicate.
    Slice {
        accounts: Vec<Account>,
        dates: Vec<DateRange>,
        moments: Vec<MomentRange>,
    },
    /// Sum matching transactions' entries into per-window buckets and
    /// emit one synthetic transaction per bucket after the scan.
    Projection {
        accounts: Vec<Account>,
        dates: Vec<DateRange>,
        moments: Vec<MomentRange>,
    },
}

/// The shared scan primitive: one producer task walking every block of
/// the store in storage order.
fn spawn_scan(store: Arc<dyn BlockStore>, mode: ScanMode) -> TransactionStream {
    let (tx, done, stream) = TransactionStream::channel();
    tokio::spawn(async move {
        let result = run_scan(store, mode, tx).await;
        let _ = done.send(result);
    });
    stream
}

async fn run_scan(
    store: Arc<dyn BlockStore>,
    mode: ScanMode,
    tx: mpsc::Sender<Transaction>,
) -> Result<()> {
    // Bucket key: (moment window start, date window start). BTreeMap
    // keeps emission order deterministic.
    let mut buckets: BTreeMap<(u64, u32), Entries> = BTreeMap::new();

    let mut source = store.source();
    while let Some(block) = source.next().await {
        for i in 0..block.len() {
            let transaction = block.transaction(i);
            match &mode {
                ScanMode::All => {
                    if tx.send(transaction).await.is_err() {
                        return Ok(());
                    }
                }
                ScanMode::Slice {
                    accounts,
                    dates,
                    moments,
                } => {
                    if transaction.matches(accounts, dates, moments)
                        && tx.send(transaction).await.is_err()
                    {
                        return Ok(());
                    }
                }
                ScanMode::Projection {
                    accounts,
                    dates,
                    moments,
                } => {
                    if !transaction.matches(accounts, dates, moments) {
                        continue;
                    }
                    let moment_window = moments.iter().find(|r| r.contains(transaction.moment));
                    let date_window = dates.iter().find(|r| r.contains(transaction.date));
                    let (Some(mw), Some(dw)) = (moment_window, date_window) else {
                        continue;
                    };
                    let bucket = buckets
                        .entry((mw.start.as_u64(), dw.start.as_u32()))
                        .or_default();
                    for (account, value) in &transaction.entries {
                        *bucket.entry(*account).or_insert(0) += value;
                    }
                }
            }
        }
    }
    source.finish().await?;

    for ((moment, date), mut entries) in buckets {
        // The dense variant cannot represent zero amounts; drop
        // zero-sum entries here too so both variants agree.
        entries.retain(|_, value| *value != 0);
        if entries.is_empty() {
            continue;
        }
        let synthetic = Transaction {
            moment: Moment::new(moment),
            date: Date::new(date),
            entries,
            metadata: Vec::new(),
        };
        if tx.send(synthetic).await.is_err() {
            return Ok(());
        }
    }
    Ok(())
}
