//! End-to-end flows through authorization, engine and store

use stockroom::config::EngineConfig;
use stockroom::db::{audit, KeyKind};
use stockroom::{
    authorize, AccessError, ClaimError, Engine, LedgerError, Operation, RedeemError, Role, Store,
    UserFacing,
};
use tempfile::TempDir;

const OWNER: i64 = 1;
const ADMIN: i64 = 2;

/// Engine with one owner and one admin already registered
fn create_engine() -> (Engine, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open_path(temp_dir.path().join("stockroom.db")).unwrap();
    let engine = Engine::new(store, EngineConfig::default());

    engine.seed_owners(&[OWNER]).unwrap();
    engine.set_role(OWNER, ADMIN, Role::Admin).unwrap();
    (engine, temp_dir)
}

fn verified_member(engine: &Engine, user_id: i64) {
    engine.register(user_id, Some("member")).unwrap();
    engine.verify_user(ADMIN, user_id).unwrap();
}

/// Everything observable that a refused request must leave alone
fn snapshot(engine: &Engine, users: &[i64]) -> (String, Vec<i64>, usize) {
    let stats = serde_json::to_string(&engine.store().stats().unwrap()).unwrap();
    let balances = users.iter().map(|u| engine.balance(*u).unwrap()).collect();
    let audit_len = engine
        .store()
        .read(|conn| audit::recent(conn, 1_000))
        .unwrap()
        .len();
    (stats, balances, audit_len)
}

#[test]
fn test_netflix_two_entries_three_claimers() {
    let (engine, _temp) = create_engine();
    for user in [10, 11, 12] {
        verified_member(&engine, user);
    }

    authorize(engine.store(), ADMIN, Operation::AddPlatform).unwrap();
    let netflix = engine.create_platform(ADMIN, "Netflix").unwrap().platform_id;
    engine.add_stock(ADMIN, netflix, &["e1:p1", "e2:p2"]).unwrap();

    authorize(engine.store(), 10, Operation::Claim).unwrap();
    let a = engine.claim(10, netflix).unwrap();
    assert_eq!(engine.unclaimed_count(netflix).unwrap(), 1);

    let b = engine.claim(11, netflix).unwrap();
    assert_eq!(engine.unclaimed_count(netflix).unwrap(), 0);
    assert_ne!(a.payload, b.payload);

    let c = engine.claim(12, netflix).unwrap_err();
    assert_eq!(c, ClaimError::OutOfStock(netflix));
    assert_eq!(c.user_message(), "No available stock for this platform.");

    let summary = engine.stock_summary().unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].unclaimed, 0);
}

#[test]
fn test_normal_key_redeemed_once() {
    let (engine, _temp) = create_engine();
    verified_member(&engine, 20);
    verified_member(&engine, 21);

    let code = engine.generate_keys(ADMIN, KeyKind::Normal, 1).unwrap().remove(0);

    let x = engine.redeem(20, &code).unwrap();
    assert_eq!(x.points_credited, 15);
    assert_eq!(engine.balance(20).unwrap(), 15);

    let y = engine.redeem(21, &code).unwrap_err();
    assert_eq!(y, RedeemError::AlreadyClaimed(code.clone()));
    assert_eq!(y.user_message(), "This key has already been claimed.");
    assert_eq!(engine.balance(21).unwrap(), 0);
    assert_eq!(engine.balance(20).unwrap(), 15);
}

#[test]
fn test_refusals_do_not_mutate_state() {
    let (engine, _temp) = create_engine();
    verified_member(&engine, 30);

    let hulu = engine.create_platform(ADMIN, "Hulu").unwrap().platform_id;
    let code = engine.generate_keys(ADMIN, KeyKind::Premium, 1).unwrap().remove(0);
    engine.redeem(30, &code).unwrap();
    engine.credit(31, 5).unwrap();

    let before = snapshot(&engine, &[30, 31]);

    for _ in 0..2 {
        assert_eq!(engine.claim(30, hulu), Err(ClaimError::OutOfStock(hulu)));
        assert_eq!(engine.claim(30, 9_999), Err(ClaimError::UnknownPlatform(9_999)));
        assert!(matches!(engine.redeem(30, &code), Err(RedeemError::AlreadyClaimed(_))));
        assert!(matches!(engine.redeem(30, "does-not-exist"), Err(RedeemError::InvalidCode(_))));
        assert!(matches!(
            engine.credit(31, -6),
            Err(LedgerError::InsufficientBalance { balance: 5, .. })
        ));
    }

    assert_eq!(snapshot(&engine, &[30, 31]), before);
}

#[test]
fn test_authorization_gates() {
    let (engine, _temp) = create_engine();
    engine.register(40, None).unwrap();

    // members cannot stock inventory
    assert!(matches!(
        authorize(engine.store(), 40, Operation::AddStock),
        Err(AccessError::Forbidden { .. })
    ));
    // admins cannot hand out points
    assert!(matches!(
        authorize(engine.store(), ADMIN, Operation::GivePoints),
        Err(AccessError::Forbidden { .. })
    ));
    assert!(authorize(engine.store(), OWNER, Operation::GivePoints).is_ok());

    engine.set_banned(ADMIN, 40, true).unwrap();
    let denied = authorize(engine.store(), 40, Operation::Redeem).unwrap_err();
    assert!(matches!(denied, AccessError::Banned(40)));
    assert_eq!(denied.user_message(), "You are banned.");

    engine.set_banned(ADMIN, 40, false).unwrap();
    assert!(matches!(
        authorize(engine.store(), 40, Operation::Redeem),
        Err(AccessError::Unverified(40))
    ));
}

#[test]
fn test_referrals_and_admin_listing() {
    let (engine, _temp) = create_engine();

    engine.record_referral(ADMIN, 50, 51, 10).unwrap();
    engine.record_referral(ADMIN, 50, 52, 10).unwrap();
    assert!(engine.record_referral(ADMIN, 60, 51, 10).is_err());

    let summary = engine.referral_summary(50).unwrap();
    assert_eq!(summary.total_referrals, 2);
    assert_eq!(summary.points_earned, 20);
    assert_eq!(engine.balance(50).unwrap(), 20);
    assert_eq!(engine.balance(60).unwrap(), 0);

    let admins: Vec<(i64, Role)> = engine
        .list_admins()
        .unwrap()
        .into_iter()
        .map(|u| (u.user_id, u.role()))
        .collect();
    assert_eq!(admins, vec![(OWNER, Role::Owner), (ADMIN, Role::Admin)]);
}

#[test]
fn test_give_points_and_deduct() {
    let (engine, _temp) = create_engine();

    assert_eq!(engine.give_points(OWNER, 70, 100).unwrap(), 100);
    assert_eq!(engine.give_points(OWNER, 70, -40).unwrap(), 60);
    assert!(engine.give_points(OWNER, 70, -61).is_err());
    assert_eq!(engine.balance(70).unwrap(), 60);
}
