//! Shared behavioral battery for the Space variants
//!
//! Slice, projection, and scan semantics must not depend on the
//! representation, so every behavioral test here runs against both the
//! dense SmallSpace and the block-paginated LargeSpace.

use space_core::{
    Account, BlockStore, ChannelSpace, Config, Date, DateRange, Entries, Error, LargeSpace,
    MemoryStore, Moment, MomentRange, RocksStore, SmallSpace, Space, Transaction,
};
use std::sync::Arc;

fn transaction(moment: u64, date: u32, entries: &[(u32, i64)]) -> Transaction {
    Transaction {
        moment: Moment::new(moment),
        date: Date::new(date),
        entries: entries
            .iter()
            .map(|&(a, v)| (Account::new(a), v))
            .collect(),
        metadata: Vec::new(),
    }
}

fn dates(ranges: &[(u32, u32)]) -> Vec<DateRange> {
    ranges
        .iter()
        .map(|&(s, e)| DateRange::new(Date::new(s), Date::new(e)))
        .collect()
}

fn moments(ranges: &[(u64, u64)]) -> Vec<MomentRange> {
    ranges
        .iter()
        .map(|&(s, e)| MomentRange::new(Moment::new(s), Moment::new(e)))
        .collect()
}

fn accounts(indices: &[u32]) -> Vec<Account> {
    indices.iter().copied().map(Account::new).collect()
}

fn sorted(mut transactions: Vec<Transaction>) -> Vec<Transaction> {
    transactions.sort_by_key(|t| t.moment);
    transactions
}

#[derive(Debug, Clone, Copy)]
enum Variant {
    Small,
    Large,
}

const VARIANTS: [Variant; 2] = [Variant::Small, Variant::Large];

async fn build(variant: Variant, transactions: &[Transaction]) -> Box<dyn Space> {
    match variant {
        Variant::Small => Box::new(SmallSpace::from_transactions(transactions)),
        Variant::Large => {
            let store: Arc<dyn BlockStore> = Arc::new(MemoryStore::new());
            let mut space = LargeSpace::new(store, &Config::default());
            let source = ChannelSpace::from_transactions(transactions.to_vec());
            space.append(&source).await.unwrap();
            Box::new(space)
        }
    }
}

#[tokio::test]
async fn test_round_trip_single_transaction() {
    let mut t = transaction(1, 20140501, &[(1, 100), (2, -100)]);
    t.metadata = b"memo:opening".to_vec();

    for variant in VARIANTS {
        let space = build(variant, std::slice::from_ref(&t)).await;
        let all = space.transactions().collect().await.unwrap();
        assert_eq!(all, vec![t.clone()], "variant {:?}", variant);
    }
}

#[tokio::test]
async fn test_transactions_scan_is_restartable() {
    let input = vec![
        transaction(1, 20140501, &[(1, 100), (2, -100)]),
        transaction(2, 20140502, &[(1, 50), (2, -50)]),
    ];

    for variant in VARIANTS {
        let space = build(variant, &input).await;
        let first = sorted(space.transactions().collect().await.unwrap());
        let second = sorted(space.transactions().collect().await.unwrap());
        assert_eq!(first, second, "variant {:?}", variant);
        assert_eq!(first, input, "variant {:?}", variant);
    }
}

#[tokio::test]
async fn test_slice_inclusive_on_both_ends() {
    let input = vec![
        transaction(1, 20140430, &[(1, 1), (2, -1)]),
        transaction(2, 20140501, &[(1, 2), (2, -2)]),
        transaction(3, 20140515, &[(1, 3), (2, -3)]),
        transaction(4, 20140531, &[(1, 4), (2, -4)]),
        transaction(5, 20140601, &[(1, 5), (2, -5)]),
    ];

    for variant in VARIANTS {
        let space = build(variant, &input).await;
        let result = space
            .slice(&[], &dates(&[(20140501, 20140531)]), &moments(&[(1, 5)]))
            .unwrap();
        let got = sorted(result.transactions().collect().await.unwrap());
        assert_eq!(got, input[1..4].to_vec(), "variant {:?}", variant);
    }
}

#[tokio::test]
async fn test_slice_moment_bounds_inclusive() {
    let input = vec![
        transaction(9, 20140501, &[(1, 1), (2, -1)]),
        transaction(10, 20140501, &[(1, 2), (2, -2)]),
        transaction(20, 20140501, &[(1, 3), (2, -3)]),
        transaction(21, 20140501, &[(1, 4), (2, -4)]),
    ];

    for variant in VARIANTS {
        let space = build(variant, &input).await;
        let result = space
            .slice(&[], &dates(&[(20140501, 20140501)]), &moments(&[(10, 20)]))
            .unwrap();
        let got = sorted(result.transactions().collect().await.unwrap());
        assert_eq!(got, input[1..3].to_vec(), "variant {:?}", variant);
    }
}

#[tokio::test]
async fn test_slice_returns_whole_transactions() {
    let input = vec![
        transaction(1, 20140501, &[(1, 100), (2, -100)]),
        transaction(2, 20140502, &[(3, 70), (4, -70)]),
    ];

    for variant in VARIANTS {
        let space = build(variant, &input).await;
        let result = space
            .slice(
                &accounts(&[1]),
                &dates(&[(20140501, 20140531)]),
                &moments(&[(1, 10)]),
            )
            .unwrap();
        let got = result.transactions().collect().await.unwrap();
        // The account filter selects transactions, not entries: account
        // 2's entry comes back intact.
        assert_eq!(got, vec![input[0].clone()], "variant {:?}", variant);
    }
}

#[tokio::test]
async fn test_slice_empty_account_list_matches_all() {
    let input = vec![
        transaction(1, 20140501, &[(1, 100), (2, -100)]),
        transaction(2, 20140502, &[(3, 70), (4, -70)]),
    ];

    for variant in VARIANTS {
        let space = build(variant, &input).await;
        let result = space
            .slice(&[], &dates(&[(20140501, 20140531)]), &moments(&[(1, 10)]))
            .unwrap();
        let got = sorted(result.transactions().collect().await.unwrap());
        assert_eq!(got, input, "variant {:?}", variant);
    }
}

#[tokio::test]
async fn test_projection_buckets_at_window_start() {
    // The worked example: two transactions inside one window collapse
    // to a single synthetic transaction at the window start.
    let input = vec![
        transaction(1, 20140501, &[(1, 100), (2, -100)]),
        transaction(2, 20140502, &[(1, 50), (2, -50)]),
    ];

    for variant in VARIANTS {
        let space = build(variant, &input).await;
        let result = space
            .projection(&[], &dates(&[(20140501, 20140502)]), &moments(&[(1, 2)]))
            .unwrap();
        let got = result.transactions().collect().await.unwrap();
        assert_eq!(
            got,
            vec![transaction(1, 20140501, &[(1, 150), (2, -150)])],
            "variant {:?}",
            variant
        );
    }
}

#[tokio::test]
async fn test_projection_separate_windows_stay_separate() {
    let input = vec![
        transaction(1, 20140501, &[(1, 100), (2, -100)]),
        transaction(2, 20140502, &[(1, 50), (2, -50)]),
        transaction(3, 20140511, &[(1, 25), (2, -25)]),
    ];

    for variant in VARIANTS {
        let space = build(variant, &input).await;
        let result = space
            .projection(
                &[],
                &dates(&[(20140501, 20140510), (20140511, 20140520)]),
                &moments(&[(1, 10)]),
            )
            .unwrap();
        let got = sorted(result.transactions().collect().await.unwrap());
        assert_eq!(
            got,
            vec![
                transaction(1, 20140501, &[(1, 150), (2, -150)]),
                transaction(1, 20140511, &[(1, 25), (2, -25)]),
            ],
            "variant {:?}",
            variant
        );
    }
}

#[tokio::test]
async fn test_projection_unmatched_transactions_contribute_nothing() {
    let input = vec![
        transaction(1, 20140501, &[(1, 100), (2, -100)]),
        transaction(2, 20140601, &[(1, 999), (2, -999)]),
    ];

    for variant in VARIANTS {
        let space = build(variant, &input).await;
        let result = space
            .projection(&[], &dates(&[(20140501, 20140531)]), &moments(&[(1, 10)]))
            .unwrap();
        let got = result.transactions().collect().await.unwrap();
        assert_eq!(
            got,
            vec![transaction(1, 20140501, &[(1, 100), (2, -100)])],
            "variant {:?}",
            variant
        );
    }
}

#[tokio::test]
async fn test_append_merges_foreign_space() {
    let first = vec![transaction(1, 20140501, &[(1, 100), (2, -100)])];
    let second = vec![transaction(2, 20140502, &[(1, 50), (2, -50)])];

    for variant in VARIANTS {
        let mut space = build(variant, &first).await;
        let foreign = SmallSpace::from_transactions(&second);
        space.append(&foreign).await.unwrap();

        let got = sorted(space.transactions().collect().await.unwrap());
        assert_eq!(
            got,
            vec![first[0].clone(), second[0].clone()],
            "variant {:?}",
            variant
        );
    }
}

// Block pagination specifics (LargeSpace only).

fn tiny_config() -> Config {
    // 1280 bits / 320 bits per average transaction = 4 transactions.
    Config {
        block_bits: 1280,
        ..Config::default()
    }
}

async fn block_lengths(store: &MemoryStore) -> Vec<usize> {
    let mut source = store.source();
    let mut lengths = Vec::new();
    while let Some(block) = source.next().await {
        lengths.push(block.len());
    }
    source.finish().await.unwrap();
    lengths
}

#[tokio::test]
async fn test_capacity_plus_one_splits_into_two_blocks() {
    let store = Arc::new(MemoryStore::new());
    let config = tiny_config();
    let mut space = LargeSpace::new(Arc::clone(&store) as Arc<dyn BlockStore>, &config);
    assert_eq!(space.capacity(), 4);

    let input: Vec<Transaction> = (1..=5)
        .map(|i| transaction(i, 20140500 + i as u32, &[(1, 10), (2, -10)]))
        .collect();
    let source = ChannelSpace::from_transactions(input.clone());
    space.append(&source).await.unwrap();

    assert_eq!(block_lengths(&store).await, vec![4, 1]);
    let got = sorted(space.transactions().collect().await.unwrap());
    assert_eq!(got, input);
}

#[tokio::test]
async fn test_entry_heavy_transaction_forces_split() {
    let store = Arc::new(MemoryStore::new());
    let config = tiny_config();
    let mut space = LargeSpace::new(Arc::clone(&store) as Arc<dyn BlockStore>, &config);

    // Seven entries leave one slot in the 8-entry budget; the next
    // two-entry transaction does not fit and opens a second block.
    let wide = transaction(
        1,
        20140501,
        &[(1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (6, 6), (7, -21)],
    );
    let narrow = transaction(2, 20140502, &[(1, 50), (2, -50)]);
    let source = ChannelSpace::from_transactions(vec![wide.clone(), narrow.clone()]);
    space.append(&source).await.unwrap();

    assert_eq!(block_lengths(&store).await, vec![1, 1]);
    let got = sorted(space.transactions().collect().await.unwrap());
    assert_eq!(got, vec![wide, narrow]);
}

#[tokio::test]
async fn test_oversized_transaction_fits_in_fresh_block() {
    let store = Arc::new(MemoryStore::new());
    let config = tiny_config();
    let mut space = LargeSpace::new(Arc::clone(&store) as Arc<dyn BlockStore>, &config);

    // More entries than a whole block's budget: an empty block still
    // accepts it.
    let entries: Vec<(u32, i64)> = (1..=12).map(|a| (a, a as i64)).collect();
    let huge = transaction(1, 20140501, &entries);
    let source = ChannelSpace::from_transactions(vec![huge.clone()]);
    space.append(&source).await.unwrap();

    assert_eq!(block_lengths(&store).await, vec![1]);
    let got = space.transactions().collect().await.unwrap();
    assert_eq!(got, vec![huge]);
}

#[tokio::test]
async fn test_later_transactions_fill_earlier_blocks() {
    let store = Arc::new(MemoryStore::new());
    let config = tiny_config();
    let mut space = LargeSpace::new(Arc::clone(&store) as Arc<dyn BlockStore>, &config);

    // The wide transaction leaves exactly one small transaction's worth
    // of entry budget in block 0; transaction 2 takes it, transactions
    // 3 and 4 overflow into a second block.
    let wide = transaction(
        1,
        20140501,
        &[(1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (6, -15)],
    );
    let source = ChannelSpace::from_transactions(vec![
        wide,
        transaction(2, 20140502, &[(1, 1), (2, -1)]),
        transaction(3, 20140503, &[(1, 2), (2, -2)]),
        transaction(4, 20140504, &[(1, 3), (2, -3)]),
    ]);
    space.append(&source).await.unwrap();

    // Block 0: wide (6 entries) + transaction 2 (2 entries, exactly
    // filling the 8-entry budget). Block 1: transactions 3 and 4.
    assert_eq!(block_lengths(&store).await, vec![2, 2]);
}

#[tokio::test]
async fn test_transaction_exceeding_block_addressing_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let mut space = LargeSpace::new(Arc::clone(&store) as Arc<dyn BlockStore>, &Config::default());

    // The boundary column addresses at most u16::MAX entries; a wider
    // transaction must fail loudly instead of wrapping the offsets.
    let entries: Entries = (1..=70_000u32).map(|a| (Account::new(a), 1)).collect();
    let huge = Transaction {
        moment: Moment::new(1),
        date: Date::new(20140501),
        entries,
        metadata: Vec::new(),
    };
    let source = ChannelSpace::from_transactions(vec![huge]);

    let result = space.append(&source).await;
    assert!(matches!(result, Err(Error::TransactionTooLarge { .. })));
    assert_eq!(store.block_count(), 0);
}

// RocksDB-backed engine.

#[tokio::test]
async fn test_rocks_backed_space_survives_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: temp_dir.path().to_path_buf(),
        block_bits: 1280,
    };

    let input = vec![
        transaction(1, 20140501, &[(1, 100), (2, -100)]),
        transaction(2, 20140502, &[(1, 50), (2, -50)]),
    ];

    {
        let store: Arc<dyn BlockStore> = Arc::new(RocksStore::open(&config).unwrap());
        let mut space = LargeSpace::new(store, &config);
        let source = ChannelSpace::from_transactions(input.clone());
        space.append(&source).await.unwrap();

        let got = sorted(space.transactions().collect().await.unwrap());
        assert_eq!(got, input);
    }

    // The dropped store's writer task releases the database lock
    // asynchronously.
    let mut reopened = None;
    for _ in 0..100 {
        match RocksStore::open(&config) {
            Ok(store) => {
                reopened = Some(store);
                break;
            }
            Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
        }
    }
    let store: Arc<dyn BlockStore> = Arc::new(reopened.expect("database lock not released"));
    let space = LargeSpace::new(store, &config);
    let got = sorted(space.transactions().collect().await.unwrap());
    assert_eq!(got, input);
}
