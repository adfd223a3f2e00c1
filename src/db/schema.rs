/// Schema for all tables in the local database.
pub const SCHEMA: &str = r#"
-- Named cache generations per site scope; one per scope is current after activation
CREATE TABLE IF NOT EXISTS cache_generations (
    scope TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope, name)
);

-- Stored responses keyed by request identity within a generation
CREATE TABLE IF NOT EXISTS cache_entries (
    scope TEXT NOT NULL,
    generation TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    response_type TEXT NOT NULL,
    redirected INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope, generation, request_hash),
    FOREIGN KEY (scope, generation) REFERENCES cache_generations(scope, name) ON DELETE CASCADE
);

-- Page-side key/value storage (like flags)
CREATE TABLE IF NOT EXISTS local_storage (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Worker registration: which generation serves requests
CREATE TABLE IF NOT EXISTS registration (
    scope TEXT PRIMARY KEY,
    active_generation TEXT,
    state TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
