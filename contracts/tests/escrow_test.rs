//! Integration tests for the escrow vault.
//!
//! These run the full service against a real sled store and asset ledger
//! with a manual clock, covering the operator registry, deposit creation,
//! the disbursement window and reclaim, plus concurrent access.

use std::sync::Arc;
use std::thread;

use caliber_contracts::{DepositKey, DepositPhase, Escrow, EscrowError};
use caliber_protocol::asset::{Asset, AssetLedger, AssetTransfer};
use caliber_protocol::clock::ManualClock;
use caliber_protocol::config::{EscrowConfig, MAX_OPERATORS};
use caliber_protocol::crypto::CaliberKeypair;
use caliber_protocol::identity::Address;
use caliber_protocol::storage::CaliberDB;

const WINDOW: u64 = 20;

type TestEscrow = Escrow<CaliberDB, AssetLedger, Arc<ManualClock>>;

struct Harness {
    escrow: TestEscrow,
    clock: Arc<ManualClock>,
    admin: Address,
    operators: Vec<Address>,
    user: Address,
    receivers: Vec<Address>,
}

fn fresh_address() -> Address {
    CaliberKeypair::generate().address()
}

/// Mirrors the usual fixture: admin, five operators, a funded user and five
/// receivers, with the clock at the current wall time.
fn harness() -> Harness {
    let db = CaliberDB::open_temporary().unwrap();
    let ledger = AssetLedger::new(&db);
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let escrow = Escrow::new(
        db,
        ledger,
        Arc::clone(&clock),
        EscrowConfig::with_transfer_window(WINDOW),
    );

    let user = fresh_address();
    escrow
        .ledger()
        .mint(&Asset::Native, &user, 1_000_000_000)
        .unwrap();

    Harness {
        escrow,
        clock,
        admin: fresh_address(),
        operators: (0..MAX_OPERATORS).map(|_| fresh_address()).collect(),
        user,
        receivers: (0..5).map(|_| fresh_address()).collect(),
    }
}

impl Harness {
    fn init(&self) {
        self.escrow
            .initialize_vault(&self.admin, &self.operators)
            .unwrap();
    }

    fn deposit(&self, salt: u64, amount: u64) -> DepositKey {
        self.escrow
            .deposit(&self.user, salt, amount, Asset::Native, self.receivers.clone())
            .unwrap()
    }

    fn balance(&self, who: &Address) -> u64 {
        self.escrow.ledger().balance_of(&Asset::Native, who).unwrap()
    }
}

// ---------------------------------------------------------------------------
// Operator Registry
// ---------------------------------------------------------------------------

#[test]
fn full_operator_set_rejects_duplicates_and_extras() {
    let h = harness();
    h.init();
    assert_eq!(h.escrow.get_vault().unwrap().unwrap().operators.len(), 5);

    assert_eq!(
        h.escrow.add_operator(&h.admin, &h.operators[0]),
        Err(EscrowError::OperatorAlreadyExists)
    );
    assert_eq!(
        h.escrow.add_operator(&h.admin, &fresh_address()),
        Err(EscrowError::ExceedOperatorLimit)
    );
}

#[test]
fn remove_and_re_add_restores_membership() {
    let h = harness();
    h.init();

    assert_eq!(
        h.escrow.remove_operator(&h.admin, &fresh_address()),
        Err(EscrowError::OperatorNotExists)
    );

    h.escrow.remove_operator(&h.admin, &h.operators[0]).unwrap();
    assert_eq!(h.escrow.get_vault().unwrap().unwrap().operators.len(), 4);
    h.escrow.add_operator(&h.admin, &h.operators[0]).unwrap();

    let mut now = h.escrow.get_vault().unwrap().unwrap().operators;
    let mut before = h.operators.clone();
    now.sort();
    before.sort();
    assert_eq!(now, before);
}

#[test]
fn non_admin_cannot_touch_operators() {
    let h = harness();
    h.init();
    assert_eq!(
        h.escrow.add_operator(&h.operators[0], &fresh_address()),
        Err(EscrowError::Unauthorized)
    );
    assert_eq!(
        h.escrow.remove_operator(&h.user, &h.operators[1]),
        Err(EscrowError::Unauthorized)
    );
}

#[test]
fn vault_initializes_once() {
    let h = harness();
    h.init();
    assert_eq!(
        h.escrow.initialize_vault(&h.user, &[]),
        Err(EscrowError::AlreadyInitialized)
    );
    assert_eq!(h.escrow.get_vault().unwrap().unwrap().admin, h.admin);
}

// ---------------------------------------------------------------------------
// Deposits
// ---------------------------------------------------------------------------

#[test]
fn deposit_creates_clean_record() {
    let h = harness();
    h.init();
    let key = h.deposit(1, 5);

    let d = h.escrow.get_deposit(&key).unwrap().unwrap();
    assert_eq!(d.amount, 5);
    assert_eq!(d.allowed_list, h.receivers);
    assert_eq!(d.transferred_amount, 0);
    assert_eq!(d.withdraw_amount, 0);
    assert_eq!(h.escrow.phase(&d), DepositPhase::Disbursing);
}

#[test]
fn deposit_allow_list_rules() {
    let h = harness();
    h.init();

    let dup = vec![h.receivers[0], h.receivers[0]];
    assert_eq!(
        h.escrow.deposit(&h.user, 1, 5, Asset::Native, dup),
        Err(EscrowError::DuplicateAllowedReceiver)
    );

    let mut six = h.receivers.clone();
    six.push(fresh_address());
    assert_eq!(
        h.escrow.deposit(&h.user, 2, 5, Asset::Native, six),
        Err(EscrowError::ExceedAllowedListLimit)
    );

    // Nothing was charged for the rejected attempts.
    assert_eq!(h.balance(&h.user), 1_000_000_000);
}

#[test]
fn deposits_list_in_salt_order() {
    let h = harness();
    h.init();
    for salt in [30, 10, 20] {
        h.deposit(salt, 1);
    }
    let salts: Vec<u64> = h
        .escrow
        .list_deposits(&h.user)
        .unwrap()
        .iter()
        .map(|d| d.salt)
        .collect();
    assert_eq!(salts, vec![10, 20, 30]);
    assert!(h.escrow.list_deposits(&h.admin).unwrap().is_empty());
}

#[test]
fn fungible_deposits_use_their_own_balances() {
    let h = harness();
    h.init();
    let mint = fresh_address();
    let usd = Asset::Fungible(mint);
    h.escrow.ledger().mint(&usd, &h.user, 500).unwrap();

    let key = h
        .escrow
        .deposit(&h.user, 1, 500, usd, vec![h.receivers[0]])
        .unwrap();
    h.escrow
        .disburse(&h.operators[0], &key, &h.receivers[0], 200)
        .unwrap();

    let ledger = h.escrow.ledger();
    assert_eq!(ledger.balance_of(&usd, &h.receivers[0]).unwrap(), 200);
    assert_eq!(ledger.balance_of(&Asset::Native, &h.receivers[0]).unwrap(), 0);

    h.clock.advance(WINDOW + 1);
    assert_eq!(h.escrow.reclaim(&h.user, &key).unwrap(), 300);
    assert_eq!(ledger.balance_of(&usd, &h.user).unwrap(), 300);
}

// ---------------------------------------------------------------------------
// Disbursement & Reclaim
// ---------------------------------------------------------------------------

#[test]
fn disburse_within_window() {
    let h = harness();
    h.init();
    let key = h.deposit(1, 5);
    let op = &h.operators[0];

    assert_eq!(h.escrow.disburse(op, &key, &h.receivers[0], 1).unwrap(), 1);
    assert_eq!(h.balance(&h.receivers[0]), 1);

    assert_eq!(
        h.escrow.disburse(op, &key, &fresh_address(), 1),
        Err(EscrowError::InvalidAllowedReceiver)
    );
    assert_eq!(
        h.escrow.disburse(op, &key, &h.receivers[0], 5),
        Err(EscrowError::ExceedTransferAmount)
    );
    assert_eq!(
        h.escrow.disburse(op, &key, &h.receivers[0], u64::MAX),
        Err(EscrowError::ArithmeticOverflow)
    );
    assert_eq!(
        h.escrow.get_deposit(&key).unwrap().unwrap().transferred_amount,
        1
    );
}

#[test]
fn reclaim_after_window() {
    let h = harness();
    h.init();
    let key = h.deposit(1, 5);
    h.escrow
        .disburse(&h.operators[0], &key, &h.receivers[0], 1)
        .unwrap();

    assert_eq!(h.escrow.reclaim(&h.user, &key), Err(EscrowError::InTransferTime));

    h.clock.advance(WINDOW + 1);
    let before = h.balance(&h.user);
    assert_eq!(h.escrow.reclaim(&h.user, &key).unwrap(), 4);
    assert_eq!(h.balance(&h.user), before + 4);

    assert_eq!(h.escrow.reclaim(&h.user, &key), Err(EscrowError::NoWithdrawAmount));
    assert_eq!(
        h.escrow.disburse(&h.operators[0], &key, &h.receivers[0], 1),
        Err(EscrowError::ExpiredTransferTime)
    );

    let d = h.escrow.get_deposit(&key).unwrap().unwrap();
    assert_eq!(d.withdraw_amount, 4);
    assert_eq!(d.transferred_amount, 1);
    assert_eq!(h.escrow.phase(&d), DepositPhase::Settled);
}

#[test]
fn only_owner_reclaims() {
    let h = harness();
    h.init();
    let key = h.deposit(1, 5);
    h.clock.advance(WINDOW + 1);
    assert_eq!(
        h.escrow.reclaim(&h.operators[0], &key),
        Err(EscrowError::Unauthorized)
    );
    assert_eq!(
        h.escrow.reclaim(&h.admin, &key),
        Err(EscrowError::Unauthorized)
    );
}

#[test]
fn gates_are_disjoint_at_every_instant() {
    let h = harness();
    h.init();
    let key = h.deposit(1, 1_000);
    let d = h.escrow.get_deposit(&key).unwrap().unwrap();

    for offset in 0..=(WINDOW + 3) {
        h.clock.set(d.deposited_at + offset);
        let disbursed = h
            .escrow
            .disburse(&h.operators[0], &key, &h.receivers[0], 1)
            .is_ok();
        let reclaimed = h.escrow.reclaim(&h.user, &key).is_ok();
        assert!(!(disbursed && reclaimed), "both gates open at +{offset}s");
        assert_eq!(disbursed, offset <= WINDOW);
    }
}

#[test]
fn round_trip_outflows_equal_deposit() {
    let h = harness();
    h.init();
    let amount = 1_000;
    let key = h.deposit(1, amount);

    let parts = [120u64, 5, 300, 1, 74];
    for (i, part) in parts.iter().enumerate() {
        h.escrow
            .disburse(&h.operators[i % 5], &key, &h.receivers[i], *part)
            .unwrap();
    }
    let disbursed: u64 = parts.iter().sum();

    h.clock.advance(WINDOW + 1);
    let reclaimed = h.escrow.reclaim(&h.user, &key).unwrap();
    assert_eq!(reclaimed, amount - disbursed);

    let received: u64 = h.receivers.iter().map(|r| h.balance(r)).sum();
    assert_eq!(received + reclaimed, amount);
    assert_eq!(h.balance(&h.escrow.pool_address()), 0);
}

#[test]
fn pool_as_receiver_is_refused_so_funds_cannot_strand() {
    let h = harness();
    h.init();
    let pool = h.escrow.pool_address();
    let before = h.balance(&h.user);

    assert_eq!(
        h.escrow.deposit(&h.user, 1, 10, Asset::Native, vec![pool]),
        Err(EscrowError::InvalidAllowedReceiver)
    );
    assert_eq!(h.balance(&h.user), before);
    assert_eq!(h.balance(&pool), 0);

    // The same money deposited with a real receiver still round-trips.
    let key = h
        .escrow
        .deposit(&h.user, 1, 10, Asset::Native, vec![h.receivers[0]])
        .unwrap();
    h.clock.advance(WINDOW + 1);
    assert_eq!(h.escrow.reclaim(&h.user, &key).unwrap(), 10);
    assert_eq!(h.balance(&h.user), before);
    assert_eq!(h.balance(&pool), 0);
}

#[test]
fn fully_disbursed_deposit_has_nothing_to_reclaim() {
    let h = harness();
    h.init();
    let key = h.deposit(1, 5);
    h.escrow
        .disburse(&h.operators[0], &key, &h.receivers[0], 5)
        .unwrap();
    h.clock.advance(WINDOW + 1);
    assert_eq!(h.escrow.reclaim(&h.user, &key), Err(EscrowError::NoWithdrawAmount));
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_disbursements_never_exceed_cap() {
    let h = Arc::new(harness());
    h.init();
    let key = h.deposit(1, 100);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                let mut ok = 0u64;
                for _ in 0..25 {
                    if h.escrow
                        .disburse(&h.operators[t % 5], &key, &h.receivers[t % 5], 1)
                        .is_ok()
                    {
                        ok += 1;
                    }
                }
                ok
            })
        })
        .collect();

    let succeeded: u64 = handles
        .into_iter()
        .map(|h| h.join().expect("disburse thread should not panic"))
        .sum();

    assert_eq!(succeeded, 100);
    let d = h.escrow.get_deposit(&key).unwrap().unwrap();
    assert_eq!(d.transferred_amount, 100);
    let received: u64 = h.receivers.iter().map(|r| h.balance(r)).sum();
    assert_eq!(received, 100);
}

#[test]
fn concurrent_operator_adds_respect_limit() {
    let h = Arc::new(harness());
    h.escrow.initialize_vault(&h.admin, &[]).unwrap();

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let h = Arc::clone(&h);
            thread::spawn(move || h.escrow.add_operator(&h.admin, &fresh_address()).is_ok())
        })
        .collect();
    let added = handles
        .into_iter()
        .map(|h| h.join().expect("add thread should not panic"))
        .filter(|ok| *ok)
        .count();

    assert_eq!(added, MAX_OPERATORS);
    assert_eq!(
        h.escrow.get_vault().unwrap().unwrap().operators.len(),
        MAX_OPERATORS
    );
}

#[test]
fn concurrent_initialization_has_one_winner() {
    let h = Arc::new(harness());
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let h = Arc::clone(&h);
            thread::spawn(move || h.escrow.initialize_vault(&fresh_address(), &[]).is_ok())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().expect("init thread should not panic"))
        .filter(|ok| *ok)
        .count();
    assert_eq!(winners, 1);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let admin = fresh_address();
    let user = fresh_address();
    let rx = fresh_address();
    let clock = Arc::new(ManualClock::new(1_000));

    let key = {
        let db = CaliberDB::open(dir.path()).unwrap();
        let escrow = Escrow::new(
            db.clone(),
            AssetLedger::new(&db),
            Arc::clone(&clock),
            EscrowConfig::with_transfer_window(WINDOW),
        );
        escrow.initialize_vault(&admin, &[admin]).unwrap();
        escrow.ledger().mint(&Asset::Native, &user, 10).unwrap();
        let key = escrow.deposit(&user, 9, 10, Asset::Native, vec![rx]).unwrap();
        escrow.disburse(&admin, &key, &rx, 3).unwrap();
        db.flush().unwrap();
        key
    };

    let db = CaliberDB::open(dir.path()).unwrap();
    let escrow = Escrow::new(
        db.clone(),
        AssetLedger::new(&db),
        Arc::clone(&clock),
        EscrowConfig::with_transfer_window(WINDOW),
    );
    assert_eq!(escrow.get_vault().unwrap().unwrap().admin, admin);
    assert_eq!(escrow.get_deposit(&key).unwrap().unwrap().transferred_amount, 3);

    clock.advance(WINDOW + 1);
    assert_eq!(escrow.reclaim(&user, &key).unwrap(), 7);
}
