//! Database schema definitions for the Turso graph store.
//!
//! Nodes live in one table per label, edges in dedicated edge tables.
//! Embeddings are JSON float arrays ranked in the adapter; fulltext runs on
//! FTS5 mirrors kept in sync by triggers. Every statement is idempotent
//! (`IF NOT EXISTS`), so bootstrap can race across processes safely.

/// SQL to create the episodes table
pub const CREATE_EPISODES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS episodes (
    uuid TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    content TEXT NOT NULL,
    original_content TEXT NOT NULL,
    content_embedding TEXT,
    source TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    valid_at INTEGER NOT NULL,
    labels TEXT NOT NULL DEFAULT '[]',
    space_id TEXT,
    session_id TEXT,
    episode_type TEXT NOT NULL DEFAULT 'CONVERSATION'
)
";

/// SQL to create the entities table
pub const CREATE_ENTITIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS entities (
    uuid TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    name_lower TEXT NOT NULL,
    entity_type TEXT,
    attributes TEXT NOT NULL DEFAULT '{}',
    name_embedding TEXT,
    type_embedding TEXT,
    created_at INTEGER NOT NULL,
    space_id TEXT
)
";

/// SQL to create the statements table
pub const CREATE_STATEMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS statements (
    uuid TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    fact TEXT NOT NULL,
    fact_embedding TEXT,
    created_at INTEGER NOT NULL,
    valid_at INTEGER NOT NULL,
    invalid_at INTEGER,
    invalidated_by TEXT,
    attributes TEXT NOT NULL DEFAULT '{}',
    space_id TEXT,
    space_ids TEXT NOT NULL DEFAULT '[]',
    last_space_assignment INTEGER,
    space_assignment_method TEXT,
    cluster_id TEXT
)
";

/// Statement → entity edges; one row per HAS_SUBJECT/HAS_PREDICATE/HAS_OBJECT
pub const CREATE_STATEMENT_EDGES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS statement_edges (
    statement_uuid TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('subject', 'predicate', 'object')),
    entity_uuid TEXT NOT NULL,
    uuid TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (statement_uuid, role)
)
";

/// Episode → statement HAS_PROVENANCE edges
pub const CREATE_PROVENANCE_EDGES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS provenance_edges (
    episode_uuid TEXT NOT NULL,
    statement_uuid TEXT NOT NULL,
    uuid TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (episode_uuid, statement_uuid)
)
";

/// SQL to create the documents table
pub const CREATE_DOCUMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS documents (
    uuid TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    original_content TEXT NOT NULL,
    source TEXT NOT NULL,
    user_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    chunk_hashes TEXT NOT NULL DEFAULT '[]',
    previous_version_uuid TEXT,
    total_chunks INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
";

/// Document → episode CONTAINS_CHUNK edges
pub const CREATE_DOCUMENT_CHUNKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS document_chunks (
    document_uuid TEXT NOT NULL,
    episode_uuid TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    uuid TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (document_uuid, episode_uuid)
)
";

/// SQL to create the clusters table
pub const CREATE_CLUSTERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS clusters (
    uuid TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    aspect_type TEXT NOT NULL DEFAULT 'thematic',
    size INTEGER NOT NULL DEFAULT 0,
    cluster_embedding TEXT,
    embedding_count INTEGER NOT NULL DEFAULT 0,
    cohesion_score REAL,
    top_subjects TEXT NOT NULL DEFAULT '[]',
    top_predicates TEXT NOT NULL DEFAULT '[]',
    top_objects TEXT NOT NULL DEFAULT '[]',
    needs_naming INTEGER NOT NULL DEFAULT 1,
    evolved INTEGER NOT NULL DEFAULT 0,
    evolved_at INTEGER,
    user_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
";

/// Ephemeral SIMILAR_TO edges; populated per clustering run, then dropped
pub const CREATE_SIMILARITY_EDGES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS similarity_edges (
    user_id TEXT NOT NULL,
    source_uuid TEXT NOT NULL,
    target_uuid TEXT NOT NULL,
    weight REAL NOT NULL,
    shared_entities TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (source_uuid, target_uuid)
)
";

/// Cluster SPLIT_INTO edges recording evolution
pub const CREATE_CLUSTER_SPLITS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS cluster_splits (
    from_cluster TEXT NOT NULL,
    to_cluster TEXT NOT NULL,
    reason TEXT NOT NULL,
    original_size INTEGER NOT NULL,
    new_size INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (from_cluster, to_cluster)
)
";

/// Relational ingestion job records
pub const CREATE_INGESTION_QUEUE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS ingestion_queue (
    id TEXT PRIMARY KEY NOT NULL,
    workspace_id TEXT NOT NULL,
    space_id TEXT,
    priority INTEGER NOT NULL DEFAULT 0,
    data TEXT NOT NULL,
    output TEXT,
    error TEXT,
    status TEXT NOT NULL DEFAULT 'PENDING',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
";

/// Relational space rows; names unique per workspace
pub const CREATE_SPACES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS spaces (
    uuid TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    user_id TEXT NOT NULL,
    workspace_id TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    statement_count_at_last_trigger INTEGER,
    last_pattern_trigger INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (workspace_id, name)
)
";

/// Index for per-user entity candidate scans
pub const CREATE_ENTITIES_USER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_entities_user
ON entities(user_id, name_lower)
";

/// Index for per-user statement scans filtered on validity
pub const CREATE_STATEMENTS_USER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_statements_user_valid
ON statements(user_id, invalid_at)
";

/// Index for the episode context window query
pub const CREATE_EPISODES_WINDOW_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_episodes_window
ON episodes(user_id, source, session_id, valid_at DESC)
";

/// Index for statement-edge traversals by entity
pub const CREATE_STATEMENT_EDGES_ENTITY_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_statement_edges_entity
ON statement_edges(entity_uuid)
";

/// Index for provenance traversal from statements
pub const CREATE_PROVENANCE_STATEMENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_provenance_statement
ON provenance_edges(statement_uuid)
";

/// Index for the latest-version document lookup
pub const CREATE_DOCUMENTS_SESSION_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_documents_session
ON documents(user_id, session_id, version DESC)
";

/// Index for workspace-scoped queue listings
pub const CREATE_QUEUE_WORKSPACE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_queue_workspace
ON ingestion_queue(workspace_id, created_at DESC)
";

/// FTS5 mirror of `statements.fact`
pub const CREATE_STATEMENTS_FTS_TABLE: &str = r"
CREATE VIRTUAL TABLE IF NOT EXISTS statements_fts USING fts5(
    statement_uuid UNINDEXED,
    fact,
    tokenize='porter unicode61'
)
";

/// FTS5 mirror of `entities.name`
pub const CREATE_ENTITIES_FTS_TABLE: &str = r"
CREATE VIRTUAL TABLE IF NOT EXISTS entities_fts USING fts5(
    entity_uuid UNINDEXED,
    name,
    tokenize='porter unicode61'
)
";

/// Triggers keeping `statements_fts` in sync
pub const CREATE_STATEMENTS_FTS_TRIGGERS: [&str; 3] = [
    r"
CREATE TRIGGER IF NOT EXISTS statements_fts_ai AFTER INSERT ON statements BEGIN
    INSERT INTO statements_fts(statement_uuid, fact) VALUES (new.uuid, new.fact);
END
",
    r"
CREATE TRIGGER IF NOT EXISTS statements_fts_au AFTER UPDATE OF fact ON statements BEGIN
    UPDATE statements_fts SET fact = new.fact WHERE statement_uuid = new.uuid;
END
",
    r"
CREATE TRIGGER IF NOT EXISTS statements_fts_ad AFTER DELETE ON statements BEGIN
    DELETE FROM statements_fts WHERE statement_uuid = old.uuid;
END
",
];

/// Triggers keeping `entities_fts` in sync
pub const CREATE_ENTITIES_FTS_TRIGGERS: [&str; 3] = [
    r"
CREATE TRIGGER IF NOT EXISTS entities_fts_ai AFTER INSERT ON entities BEGIN
    INSERT INTO entities_fts(entity_uuid, name) VALUES (new.uuid, new.name);
END
",
    r"
CREATE TRIGGER IF NOT EXISTS entities_fts_au AFTER UPDATE OF name ON entities BEGIN
    UPDATE entities_fts SET name = new.name WHERE entity_uuid = new.uuid;
END
",
    r"
CREATE TRIGGER IF NOT EXISTS entities_fts_ad AFTER DELETE ON entities BEGIN
    DELETE FROM entities_fts WHERE entity_uuid = old.uuid;
END
",
];

/// Every DDL statement, in dependency order
#[must_use]
pub fn all_statements() -> Vec<&'static str> {
    let mut statements = vec![
        CREATE_EPISODES_TABLE,
        CREATE_ENTITIES_TABLE,
        CREATE_STATEMENTS_TABLE,
        CREATE_STATEMENT_EDGES_TABLE,
        CREATE_PROVENANCE_EDGES_TABLE,
        CREATE_DOCUMENTS_TABLE,
        CREATE_DOCUMENT_CHUNKS_TABLE,
        CREATE_CLUSTERS_TABLE,
        CREATE_SIMILARITY_EDGES_TABLE,
        CREATE_CLUSTER_SPLITS_TABLE,
        CREATE_INGESTION_QUEUE_TABLE,
        CREATE_SPACES_TABLE,
        CREATE_ENTITIES_USER_INDEX,
        CREATE_STATEMENTS_USER_INDEX,
        CREATE_EPISODES_WINDOW_INDEX,
        CREATE_STATEMENT_EDGES_ENTITY_INDEX,
        CREATE_PROVENANCE_STATEMENT_INDEX,
        CREATE_DOCUMENTS_SESSION_INDEX,
        CREATE_QUEUE_WORKSPACE_INDEX,
        CREATE_STATEMENTS_FTS_TABLE,
        CREATE_ENTITIES_FTS_TABLE,
    ];
    statements.extend(CREATE_STATEMENTS_FTS_TRIGGERS);
    statements.extend(CREATE_ENTITIES_FTS_TRIGGERS);
    statements
}
