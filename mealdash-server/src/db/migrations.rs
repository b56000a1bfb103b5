//! Schema migrations
//!
//! Every statement is idempotent (`IF NOT EXISTS`), so running them on each
//! start is safe.

use sqlx::PgPool;

const TABLES: &[(&str, &str)] = &[
    (
        "customers",
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            phone TEXT,
            address TEXT,
            wallet_balance_cents BIGINT NOT NULL DEFAULT 0 CHECK (wallet_balance_cents >= 0),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "menu_items",
        r#"
        CREATE TABLE IF NOT EXISTS menu_items (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            slug TEXT NOT NULL UNIQUE CHECK (slug ~ '^[a-z0-9][a-z0-9_-]{0,63}$'),
            name TEXT NOT NULL,
            description TEXT,
            price_cents BIGINT NOT NULL CHECK (price_cents >= 0),
            cost_per_serving_cents BIGINT NOT NULL DEFAULT 0 CHECK (cost_per_serving_cents >= 0),
            servings_per_unit INT NOT NULL DEFAULT 1 CHECK (servings_per_unit > 0),
            batch_yield INT NOT NULL DEFAULT 1 CHECK (batch_yield > 0),
            available_days SMALLINT NOT NULL DEFAULT 127,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "meal_plans",
        r#"
        CREATE TABLE IF NOT EXISTS meal_plans (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            meals_per_delivery INT NOT NULL CHECK (meals_per_delivery > 0),
            servings_per_meal INT NOT NULL DEFAULT 1 CHECK (servings_per_meal > 0),
            price_per_meal_cents BIGINT NOT NULL CHECK (price_per_meal_cents >= 0),
            active BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
    ),
    (
        "subscriptions",
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            customer_id UUID NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
            plan_id UUID NOT NULL REFERENCES meal_plans(id),
            delivery_days SMALLINT NOT NULL CHECK (delivery_days > 0),
            fulfillment TEXT NOT NULL,
            address TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "orders",
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            customer_id UUID NOT NULL REFERENCES customers(id),
            subscription_id UUID REFERENCES subscriptions(id) ON DELETE SET NULL,
            kind TEXT NOT NULL,
            fulfillment TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending_payment',
            subtotal_cents BIGINT NOT NULL,
            discount_cents BIGINT NOT NULL DEFAULT 0,
            delivery_fee_cents BIGINT NOT NULL DEFAULT 0,
            wallet_applied_cents BIGINT NOT NULL DEFAULT 0,
            total_cents BIGINT NOT NULL CHECK (total_cents >= 0),
            coupon_code TEXT,
            payment_intent_id TEXT UNIQUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "sub_orders",
        r#"
        CREATE TABLE IF NOT EXISTS sub_orders (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            order_id UUID NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            delivery_date DATE NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            shipday_order_id BIGINT UNIQUE,
            address TEXT,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (order_id, delivery_date)
        )
        "#,
    ),
    (
        "order_items",
        r#"
        CREATE TABLE IF NOT EXISTS order_items (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            sub_order_id UUID NOT NULL REFERENCES sub_orders(id) ON DELETE CASCADE,
            menu_item_id UUID NOT NULL REFERENCES menu_items(id),
            quantity INT NOT NULL CHECK (quantity > 0),
            unit_price_cents BIGINT NOT NULL CHECK (unit_price_cents >= 0),
            servings INT NOT NULL CHECK (servings > 0)
        )
        "#,
    ),
    (
        "coupons",
        r#"
        CREATE TABLE IF NOT EXISTS coupons (
            code TEXT PRIMARY KEY,
            description TEXT,
            discount_kind TEXT NOT NULL,
            discount_value BIGINT NOT NULL,
            scope TEXT NOT NULL DEFAULT 'any',
            min_subtotal_cents BIGINT,
            max_redemptions INT,
            per_customer_limit INT,
            redemptions INT NOT NULL DEFAULT 0 CHECK (redemptions >= 0),
            starts_at TIMESTAMPTZ,
            expires_at TIMESTAMPTZ,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "coupon_redemptions",
        r#"
        CREATE TABLE IF NOT EXISTS coupon_redemptions (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            coupon_code TEXT NOT NULL REFERENCES coupons(code),
            customer_id UUID NOT NULL REFERENCES customers(id),
            order_id UUID NOT NULL UNIQUE REFERENCES orders(id) ON DELETE CASCADE,
            discount_cents BIGINT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "wallet_entries",
        r#"
        CREATE TABLE IF NOT EXISTS wallet_entries (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            customer_id UUID NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
            amount_cents BIGINT NOT NULL,
            kind TEXT NOT NULL,
            order_id UUID REFERENCES orders(id) ON DELETE SET NULL,
            note TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "settings",
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value JSONB NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "webhook_events",
        r#"
        CREATE TABLE IF NOT EXISTS webhook_events (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            received_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)",
    "CREATE INDEX IF NOT EXISTS idx_orders_subscription ON orders(subscription_id) WHERE subscription_id IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_sub_orders_date ON sub_orders(delivery_date)",
    "CREATE INDEX IF NOT EXISTS idx_order_items_sub_order ON order_items(sub_order_id)",
    "CREATE INDEX IF NOT EXISTS idx_coupon_redemptions_customer ON coupon_redemptions(coupon_code, customer_id)",
    "CREATE INDEX IF NOT EXISTS idx_wallet_entries_customer ON wallet_entries(customer_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_subscriptions_customer ON subscriptions(customer_id)",
];

/// Run all migrations
pub async fn run(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running migrations...");

    for (table, ddl) in TABLES {
        tracing::debug!(table, "ensuring table");
        sqlx::query(ddl).execute(pool).await?;
    }
    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!(tables = TABLES.len(), "Migrations complete");
    Ok(())
}
