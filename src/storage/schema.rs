//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Users table schema.
#[derive(Iden)]
pub enum Users {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "external_id"]
    ExternalId,
    #[iden = "username"]
    Username,
    #[iden = "display_name"]
    DisplayName,
    #[iden = "locale"]
    Locale,
    #[iden = "referral_code"]
    ReferralCode,
    #[iden = "referrer_id"]
    ReferrerId,
    #[iden = "steps"]
    Steps,
    #[iden = "sandwiches"]
    Sandwiches,
    #[iden = "coffee"]
    Coffee,
    #[iden = "next_available_at"]
    NextAvailableAt,
    #[iden = "daily_free_count"]
    DailyFreeCount,
    #[iden = "daily_reset_date"]
    DailyResetDate,
    #[iden = "premium_until"]
    PremiumUntil,
    #[iden = "wallet_address"]
    WalletAddress,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Ledger table schema.
#[derive(Iden)]
pub enum Ledger {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "user_id"]
    UserId,
    #[iden = "kind"]
    Kind,
    #[iden = "delta_steps"]
    DeltaSteps,
    #[iden = "delta_sandwiches"]
    DeltaSandwiches,
    #[iden = "delta_coffee"]
    DeltaCoffee,
    #[iden = "idempotency_key"]
    IdempotencyKey,
    #[iden = "meta"]
    Meta,
    #[iden = "created_at"]
    CreatedAt,
}

/// Missions table schema.
#[derive(Iden)]
pub enum Missions {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "type"]
    Type,
    #[iden = "payload"]
    Payload,
    #[iden = "title"]
    Title,
    #[iden = "description"]
    Description,
    #[iden = "title_i18n"]
    TitleI18n,
    #[iden = "description_i18n"]
    DescriptionI18n,
    #[iden = "reward_steps"]
    RewardSteps,
    #[iden = "reward_sandwiches"]
    RewardSandwiches,
    #[iden = "reward_coffee"]
    RewardCoffee,
    #[iden = "is_active"]
    IsActive,
    #[iden = "starts_at"]
    StartsAt,
    #[iden = "ends_at"]
    EndsAt,
    #[iden = "created_at"]
    CreatedAt,
}

/// User missions table schema.
#[derive(Iden)]
pub enum UserMissions {
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "mission_id"]
    MissionId,
    #[iden = "status"]
    Status,
    #[iden = "completed_at"]
    CompletedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Purchases table schema.
#[derive(Iden)]
pub enum Purchases {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "user_id"]
    UserId,
    #[iden = "mission_id"]
    MissionId,
    #[iden = "provider"]
    Provider,
    #[iden = "status"]
    Status,
    #[iden = "invoice_id"]
    InvoiceId,
    #[iden = "intent_key"]
    IntentKey,
    #[iden = "receiver"]
    Receiver,
    #[iden = "sender"]
    Sender,
    #[iden = "amount_nano"]
    AmountNano,
    #[iden = "comment"]
    Comment,
    #[iden = "tx_hash"]
    TxHash,
    #[iden = "tx_lt"]
    TxLt,
    #[iden = "confirmations"]
    Confirmations,
    #[iden = "failure_reason"]
    FailureReason,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
    #[iden = "paid_at"]
    PaidAt,
}

/// Economy config key/value table schema.
#[derive(Iden)]
pub enum EconomySettings {
    Table,
    #[iden = "key"]
    Key,
    #[iden = "value"]
    Value,
}

/// SQL for creating the users table.
pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    external_id INTEGER NOT NULL UNIQUE,
    username TEXT,
    display_name TEXT,
    locale TEXT,
    referral_code TEXT NOT NULL UNIQUE,
    referrer_id TEXT REFERENCES users(id),
    steps INTEGER NOT NULL DEFAULT 0 CHECK (steps >= 0),
    sandwiches INTEGER NOT NULL DEFAULT 0 CHECK (sandwiches >= 0),
    coffee INTEGER NOT NULL DEFAULT 0 CHECK (coffee >= 0),
    next_available_at TEXT,
    daily_free_count INTEGER NOT NULL DEFAULT 0,
    daily_reset_date TEXT,
    premium_until TEXT,
    wallet_address TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_steps ON users(steps DESC);
"#;

/// SQL for creating the ledger table.
pub const CREATE_LEDGER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ledger (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    kind TEXT NOT NULL,
    delta_steps INTEGER NOT NULL DEFAULT 0,
    delta_sandwiches INTEGER NOT NULL DEFAULT 0,
    delta_coffee INTEGER NOT NULL DEFAULT 0,
    idempotency_key TEXT UNIQUE,
    meta TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_user_created ON ledger(user_id, created_at);
"#;

/// SQL for creating the missions table.
pub const CREATE_MISSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS missions (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    title_i18n TEXT NOT NULL DEFAULT '{}',
    description_i18n TEXT NOT NULL DEFAULT '{}',
    reward_steps INTEGER NOT NULL DEFAULT 0,
    reward_sandwiches INTEGER NOT NULL DEFAULT 0,
    reward_coffee INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    starts_at TEXT,
    ends_at TEXT,
    created_at TEXT NOT NULL
);
"#;

/// SQL for creating the user missions table.
pub const CREATE_USER_MISSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS user_missions (
    user_id TEXT NOT NULL REFERENCES users(id),
    mission_id TEXT NOT NULL REFERENCES missions(id),
    status TEXT NOT NULL,
    completed_at TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, mission_id)
);
"#;

/// SQL for creating the purchases table.
pub const CREATE_PURCHASES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS purchases (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    mission_id TEXT NOT NULL REFERENCES missions(id),
    provider TEXT NOT NULL,
    status TEXT NOT NULL,
    invoice_id TEXT NOT NULL UNIQUE,
    intent_key TEXT UNIQUE,
    receiver TEXT NOT NULL,
    sender TEXT,
    amount_nano TEXT NOT NULL,
    comment TEXT NOT NULL,
    tx_hash TEXT,
    tx_lt TEXT,
    confirmations INTEGER NOT NULL DEFAULT 0,
    failure_reason TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    paid_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_purchases_user_mission ON purchases(user_id, mission_id);
CREATE INDEX IF NOT EXISTS idx_purchases_status_updated ON purchases(status, updated_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_purchases_paid_tx ON purchases(tx_hash) WHERE status = 'paid';
"#;

/// SQL for creating the economy settings table.
pub const CREATE_ECONOMY_SETTINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS economy_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// All tables, in dependency order.
pub const ALL_TABLES: [&str; 6] = [
    CREATE_USERS_TABLE,
    CREATE_LEDGER_TABLE,
    CREATE_MISSIONS_TABLE,
    CREATE_USER_MISSIONS_TABLE,
    CREATE_PURCHASES_TABLE,
    CREATE_ECONOMY_SETTINGS_TABLE,
];
