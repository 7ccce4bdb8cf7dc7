// Escrow benchmarks for Caliber.
//
// Covers the disbursement hot path, deposit creation, and the pure policy
// check on its own, all against temporary sled databases.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use caliber_contracts::policy::check_disburse;
use caliber_contracts::{Deposit, Escrow, Vault};
use caliber_protocol::asset::{Asset, AssetLedger};
use caliber_protocol::clock::ManualClock;
use caliber_protocol::config::EscrowConfig;
use caliber_protocol::identity::Address;
use caliber_protocol::storage::CaliberDB;

fn addr(b: u8) -> Address {
    Address::from_bytes([b; 32])
}

fn escrow() -> Escrow<CaliberDB, AssetLedger, Arc<ManualClock>> {
    let db = CaliberDB::open_temporary().unwrap();
    let ledger = AssetLedger::new(&db);
    let escrow = Escrow::new(
        db,
        ledger,
        Arc::new(ManualClock::new(1_700_000_000)),
        EscrowConfig::default(),
    );
    escrow.initialize_vault(&addr(1), &[addr(10)]).unwrap();
    escrow.ledger().mint(&Asset::Native, &addr(2), u64::MAX / 2).unwrap();
    escrow
}

fn bench_policy_check(c: &mut Criterion) {
    let vault = Vault::new(addr(1), &[addr(10), addr(11), addr(12), addr(13), addr(14)]).unwrap();
    let deposit = Deposit {
        owner: addr(2),
        salt: 1,
        amount: 1_000_000,
        asset: Asset::Native,
        allowed_list: (30..35).map(addr).collect(),
        deposited_at: 1_700_000_000,
        transferred_amount: 500,
        withdraw_amount: 0,
    };

    c.bench_function("policy/check_disburse", |b| {
        b.iter(|| {
            check_disburse(&vault, &deposit, &addr(14), &addr(34), 1, 1_700_000_010, 86_400).unwrap()
        });
    });
}

fn bench_deposit(c: &mut Criterion) {
    let escrow = escrow();
    let mut salt = 0u64;

    c.bench_function("escrow/deposit", |b| {
        b.iter(|| {
            salt += 1;
            escrow
                .deposit(&addr(2), salt, 10, Asset::Native, vec![addr(30)])
                .unwrap()
        });
    });
}

fn bench_disburse(c: &mut Criterion) {
    let escrow = escrow();
    let key = escrow
        .deposit(&addr(2), 0, u64::MAX / 4, Asset::Native, vec![addr(30)])
        .unwrap();

    c.bench_function("escrow/disburse", |b| {
        b.iter(|| escrow.disburse(&addr(10), &key, &addr(30), 1).unwrap());
    });
}

criterion_group!(benches, bench_policy_check, bench_deposit, bench_disburse);
criterion_main!(benches);
