//! Database module - PostgreSQL connection and migrations

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create tables if not exist
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Monitored hosts
CREATE TABLE IF NOT EXISTS agents (
    id VARCHAR(64) PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    hostname VARCHAR(255),
    platform VARCHAR(100),
    ip_address VARCHAR(45),
    status VARCHAR(20) NOT NULL DEFAULT 'online',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Latest known inventory per host+category (replaced wholesale each upload)
CREATE TABLE IF NOT EXISTS inventory_current (
    id BIGSERIAL PRIMARY KEY,
    agent_id VARCHAR(64) NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
    category VARCHAR(20) NOT NULL,
    item_key VARCHAR(512) NOT NULL,
    entity_key VARCHAR(512) NOT NULL,
    item_value TEXT NOT NULL,
    cpu_percent DOUBLE PRECISION,
    memory_percent DOUBLE PRECISION,
    collected_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Round-tagged PROCESS/PORT history (append-only, pruned by retention)
CREATE TABLE IF NOT EXISTS inventory_history (
    id BIGSERIAL PRIMARY KEY,
    agent_id VARCHAR(64) NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
    category VARCHAR(20) NOT NULL,
    collection_round BIGINT NOT NULL,
    item_key VARCHAR(512) NOT NULL,
    entity_key VARCHAR(512) NOT NULL,
    item_value TEXT NOT NULL,
    cpu_percent DOUBLE PRECISION,
    memory_percent DOUBLE PRECISION,
    collected_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- One learning/active config per host+category
CREATE TABLE IF NOT EXISTS baseline_configs (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    agent_id VARCHAR(64) NOT NULL,
    category VARCHAR(20) NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'LEARNING',
    learning_mode VARCHAR(20) NOT NULL DEFAULT 'STANDARD',
    learning_days INT NOT NULL DEFAULT 7,
    learn_start TIMESTAMPTZ,
    learn_end TIMESTAMPTZ,
    sensitivity VARCHAR(20) NOT NULL DEFAULT 'MEDIUM',
    alert_enabled BOOLEAN NOT NULL DEFAULT true,
    created_type VARCHAR(20) NOT NULL DEFAULT 'LEARNING',
    source_agent_id VARCHAR(64),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (agent_id, category)
);

-- Immutable baseline captures; latest per host+category is "the baseline"
CREATE TABLE IF NOT EXISTS baseline_snapshots (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    config_id UUID NOT NULL REFERENCES baseline_configs(id) ON DELETE CASCADE,
    agent_id VARCHAR(64) NOT NULL,
    category VARCHAR(20) NOT NULL,
    snapshot_hash VARCHAR(64) NOT NULL,
    item_count INT NOT NULL DEFAULT 0,
    valid_from TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    valid_to TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Items owned by a snapshot
CREATE TABLE IF NOT EXISTS baseline_items (
    id BIGSERIAL PRIMARY KEY,
    snapshot_id UUID NOT NULL REFERENCES baseline_snapshots(id) ON DELETE CASCADE,
    item_key VARCHAR(512) NOT NULL,
    item_value TEXT NOT NULL,
    item_type VARCHAR(20) NOT NULL,
    item_hash VARCHAR(64) NOT NULL
);

-- Frequency baselines (statistical, independent of snapshots)
CREATE TABLE IF NOT EXISTS process_baselines (
    id BIGSERIAL PRIMARY KEY,
    agent_id VARCHAR(64) NOT NULL,
    process_name VARCHAR(512) NOT NULL,
    frequency DOUBLE PRECISION NOT NULL,
    frequency_category VARCHAR(20) NOT NULL,
    first_seen TIMESTAMPTZ NOT NULL,
    last_seen TIMESTAMPTZ NOT NULL,
    total_appearances INT NOT NULL DEFAULT 0,
    avg_cpu_percent DOUBLE PRECISION,
    avg_memory_percent DOUBLE PRECISION,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (agent_id, process_name)
);

CREATE TABLE IF NOT EXISTS port_baselines (
    id BIGSERIAL PRIMARY KEY,
    agent_id VARCHAR(64) NOT NULL,
    port INT NOT NULL,
    protocol VARCHAR(20) NOT NULL,
    frequency DOUBLE PRECISION NOT NULL,
    frequency_category VARCHAR(20) NOT NULL,
    first_seen TIMESTAMPTZ NOT NULL,
    last_seen TIMESTAMPTZ NOT NULL,
    total_appearances INT NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (agent_id, port, protocol)
);

-- Alerts emitted by the detection engine
CREATE TABLE IF NOT EXISTS security_alerts (
    id BIGSERIAL PRIMARY KEY,
    agent_id VARCHAR(64) NOT NULL,
    alert_type VARCHAR(20) NOT NULL,
    alert_level VARCHAR(20) NOT NULL,
    alert_title VARCHAR(500) NOT NULL,
    alert_content TEXT,
    anomaly_type VARCHAR(20),
    baseline_item TEXT,
    current_item TEXT,
    alert_status VARCHAR(20) NOT NULL DEFAULT 'NEW',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    acknowledged_at TIMESTAMPTZ,
    acknowledged_by VARCHAR(255),
    resolved_at TIMESTAMPTZ,
    resolved_by VARCHAR(255),
    resolution_note TEXT,
    ignored_at TIMESTAMPTZ,
    ignored_by VARCHAR(255),
    ignore_reason TEXT
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_inv_current_agent ON inventory_current(agent_id, category);
CREATE INDEX IF NOT EXISTS idx_inv_history_agent ON inventory_history(agent_id, category, collection_round);
CREATE INDEX IF NOT EXISTS idx_inv_history_collected ON inventory_history(collected_at);
CREATE INDEX IF NOT EXISTS idx_configs_agent ON baseline_configs(agent_id);
CREATE INDEX IF NOT EXISTS idx_snapshots_agent ON baseline_snapshots(agent_id, category, created_at);
CREATE INDEX IF NOT EXISTS idx_items_snapshot ON baseline_items(snapshot_id);
CREATE INDEX IF NOT EXISTS idx_proc_baseline_agent ON process_baselines(agent_id);
CREATE INDEX IF NOT EXISTS idx_port_baseline_agent ON port_baselines(agent_id);
CREATE INDEX IF NOT EXISTS idx_alerts_agent ON security_alerts(agent_id, created_at);
CREATE INDEX IF NOT EXISTS idx_alerts_status ON security_alerts(alert_status);
"#;
