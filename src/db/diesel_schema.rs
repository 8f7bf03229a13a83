// Mirrors the DDL in `schema.rs`; keep both in sync.

diesel::table! {
    users (user_id) {
        user_id -> BigInt,
        display_name -> Nullable<Text>,
        role -> Text,
        joined_at -> Text,
        points -> BigInt,
        verified -> Bool,
        banned -> Bool,
    }
}

diesel::table! {
    platforms (platform_id) {
        platform_id -> BigInt,
        name -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    stock (stock_id) {
        stock_id -> BigInt,
        platform_id -> BigInt,
        payload -> Text,
        is_claimed -> Bool,
        claimed_by -> Nullable<BigInt>,
        claimed_at -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    reward_keys (code) {
        code -> Text,
        kind -> Text,
        points_value -> BigInt,
        is_claimed -> Bool,
        claimed_by -> Nullable<BigInt>,
        claimed_at -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    user_logs (log_id) {
        log_id -> BigInt,
        user_id -> BigInt,
        action -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    referrals (referral_id) {
        referral_id -> BigInt,
        referrer_id -> BigInt,
        referred_id -> BigInt,
        points_earned -> BigInt,
        created_at -> Text,
    }
}

diesel::joinable!(stock -> platforms (platform_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    platforms,
    stock,
    reward_keys,
    user_logs,
    referrals,
);
