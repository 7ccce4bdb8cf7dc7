// Signing, verification and ledger benchmarks for Caliber.
//
// Covers Ed25519 keypair generation, raw signing and verification, signed
// call verification, seed-derived addresses and ledger transfers.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use caliber_protocol::asset::{Asset, AssetLedger, AssetTransfer};
use caliber_protocol::config::{USER_DEPOSIT_SEED, VAULT_SEED};
use caliber_protocol::crypto::keys::CaliberKeypair;
use caliber_protocol::crypto::signatures::{sign, verify};
use caliber_protocol::identity::{Address, SignedCall};
use caliber_protocol::storage::CaliberDB;

fn bench_keypair_generation(c: &mut Criterion) {
    c.bench_function("ed25519/keypair_generate", |b| {
        b.iter(CaliberKeypair::generate);
    });
}

fn bench_sign_message(c: &mut Criterion) {
    let keypair = CaliberKeypair::generate();
    let message = b"disburse 500 from deposit 42 to bob";

    c.bench_function("ed25519/sign_message", |b| {
        b.iter(|| sign(&keypair, message));
    });
}

fn bench_verify_signature(c: &mut Criterion) {
    let keypair = CaliberKeypair::generate();
    let message = b"disburse 500 from deposit 42 to bob";
    let signature = sign(&keypair, message);
    let public_key = keypair.public_key();

    c.bench_function("ed25519/verify_signature", |b| {
        b.iter(|| verify(&public_key, message, &signature));
    });
}

fn bench_signed_call_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("caller/verify_signed_call");

    for size in [64usize, 512, 4096] {
        let keypair = CaliberKeypair::generate();
        let call = SignedCall::sign(&keypair, 1, vec![0xAB; size]);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &call, |b, call| {
            b.iter(|| call.verify().unwrap());
        });
    }

    group.finish();
}

fn bench_derive_address(c: &mut Criterion) {
    let owner = CaliberKeypair::generate().address();
    let salt = 1_700_000_000u64.to_le_bytes();

    c.bench_function("address/derive_vault", |b| {
        b.iter(|| Address::derive(&[VAULT_SEED]));
    });
    c.bench_function("address/derive_deposit", |b| {
        b.iter(|| Address::derive(&[USER_DEPOSIT_SEED, owner.as_bytes(), &salt]));
    });
}

fn bench_ledger_transfer(c: &mut Criterion) {
    let db = CaliberDB::open_temporary().unwrap();
    let ledger = AssetLedger::new(&db);
    let alice = Address::from_bytes([1u8; 32]);
    let bob = Address::from_bytes([2u8; 32]);
    ledger.mint(&Asset::Native, &alice, u64::MAX / 2).unwrap();

    c.bench_function("ledger/transfer", |b| {
        b.iter(|| ledger.transfer(&Asset::Native, &alice, &bob, 1).unwrap());
    });
}

criterion_group!(
    benches,
    bench_keypair_generation,
    bench_sign_message,
    bench_verify_signature,
    bench_signed_call_verify,
    bench_derive_address,
    bench_ledger_transfer,
);
criterion_main!(benches);
