//! The Space abstraction
//!
//! A [`Space`] is a logical, possibly unbounded, ordered multiset of
//! transactions. Every scan-shaped operation is realized as one
//! producer task feeding a bounded [`TransactionStream`]; dropping the
//! stream cancels the producer, so abandoning a scan early never leaks
//! a task.
//!
//! # Preconditions (documented, not validated)
//!
//! - Moments are unique within one space.
//! - Projection windows do not overlap.
//! - Writers against one backing store are externally serialized; the
//!   free-block scan inside `append` is not protected against
//!   concurrent appenders.

use crate::error::{Error, Result};
use crate::types::{Account, DateRange, MomentRange, Transaction};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

/// Bounded hand-off depth for transaction scan channels.
pub(crate) const TRANSACTION_CHANNEL_CAPACITY: usize = 64;

/// An in-flight scan of transactions.
///
/// Errors surface only through [`TransactionStream::finish`], after the
/// stream is drained, never incrementally mid-stream.
#[derive(Debug)]
pub struct TransactionStream {
    rx: mpsc::Receiver<Transaction>,
    done: oneshot::Receiver<Result<()>>,
}

impl TransactionStream {
    /// Producer-side constructor: the hand-off sender, the completion
    /// slot, and the consumer's stream.
    pub(crate) fn channel() -> (
        mpsc::Sender<Transaction>,
        oneshot::Sender<Result<()>>,
        TransactionStream,
    ) {
        let (tx, rx) = mpsc::channel(TRANSACTION_CHANNEL_CAPACITY);
        let (done_tx, done_rx) = oneshot::channel();
        (tx, done_tx, TransactionStream { rx, done: done_rx })
    }

    /// A stream that yields nothing and completes with `result`.
    pub(crate) fn finished(result: Result<()>) -> TransactionStream {
        let (_tx, done_tx, stream) = Self::channel();
        let _ = done_tx.send(result);
        stream
    }

    /// Next transaction, or `None` when the scan is exhausted.
    pub async fn next(&mut self) -> Option<Transaction> {
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

    /// Drain the stream into a vector, then surface the scan result.
    pub async fn collect(mut self) -> Result<Vec<Transaction>> {
        let mut transactions = Vec::new();
        while let Some(t) = self.next().await {
            transactions.push(t);
        }
        self.finish().await?;
        Ok(transactions)
    }
}

/// A queryable, appendable collection of ledger transactions.
#[async_trait]
pub trait Space: Send + Sync {
    /// Stream every transaction of `source` into this space.
    async fn append(&mut self, source: &dyn Space) -> Result<()>;

    /// Existence filter: every whole transaction whose date lies in the
    /// union of `dates`, whose moment lies in the union of `moments`,
    /// and at least one of whose entries is on an account in `accounts`
    /// (empty list matches all). Matching transactions are returned
    /// verbatim, non-matching entries included.
    fn slice(
        &self,
        accounts: &[Account],
        dates: &[DateRange],
        moments: &[MomentRange],
    ) -> Result<Box<dyn Space>>;

    /// Range aggregation: same predicate as `slice`, but matching
    /// transactions' entries are summed per account into one synthetic
    /// transaction per `(moment window, date window)` pair, dated and
    /// timed at the window starts. Overlapping windows are a caller
    /// error and produce unspecified aggregates.
    fn projection(
        &self,
        accounts: &[Account],
        dates: &[DateRange],
        moments: &[MomentRange],
    ) -> Result<Box<dyn Space>>;

    /// Unfiltered scan in storage order, which is not guaranteed sorted
    /// by date or moment. Each call starts an independent scan.
    fn transactions(&self) -> TransactionStream;
}

/// A space over a single in-flight stream, as produced by `slice` and
/// `projection`. The stream can be consumed once; it is not
/// restartable, and the other space operations are unsupported.
#[derive(Debug)]
pub struct ChannelSpace {
    stream: Mutex<Option<TransactionStream>>,
}

impl ChannelSpace {
    /// Wrap an in-flight stream.
    pub fn new(stream: TransactionStream) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }

    /// A space streaming the given transactions in order. Useful as an
    /// append source when merging foreign data into an engine space.
    /// Must be called from within a tokio runtime.
    pub fn from_transactions(transactions: Vec<Transaction>) -> Self {
        let (tx, done, stream) = TransactionStream::channel();
        tokio::spawn(async move {
            for t in transactions {
                if tx.send(t).await.is_err() {
                    return;
                }
            }
            let _ = done.send(Ok(()));
        });
        Self::new(stream)
    }
}

#[async_trait]
impl Space for ChannelSpace {
    async fn append(&mut self, _source: &dyn Space) -> Result<()> {
        Err(Error::Unsupported("append on a streamed space"))
    }

    fn slice(
        &self,
        _accounts: &[Account],
        _dates: &[DateRange],
        _moments: &[MomentRange],
    ) -> Result<Box<dyn Space>> {
        Err(Error::Unsupported("slice on a streamed space"))
    }

    fn projection(
        &self,
        _accounts: &[Account],
        _dates: &[DateRange],
        _moments: &[MomentRange],
    ) -> Result<Box<dyn Space>> {
        Err(Error::Unsupported("projection on a streamed space"))
    }

    fn transactions(&self) -> TransactionStream {
        match self.stream.lock().take() {
            Some(stream) => stream,
            None => TransactionStream::finished(Err(Error::Channel(
                "stream already consumed".to_string(),
            ))),
        }
    }
}
