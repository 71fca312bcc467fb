pub const CREATE_CHECKPOINTS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS checkpoints (\
    thread_id TEXT NOT NULL,\
    seq BIGINT NOT NULL,\
    created_at TEXT NOT NULL,\
    node TEXT,\
    step BIGINT,\
    owner TEXT,\
    state_json TEXT NOT NULL,\
    PRIMARY KEY (thread_id, seq)\
)";

pub const CREATE_OWNER_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_checkpoints_owner ON checkpoints (owner, thread_id)";

pub const MIGRATION_STATEMENTS_SQL: [&str; 2] =
    [CREATE_CHECKPOINTS_TABLE_SQL, CREATE_OWNER_INDEX_SQL];

pub(crate) const NEXT_SEQ_SQL: &str =
    "SELECT COALESCE(MAX(seq), 0) + 1 FROM checkpoints WHERE thread_id = $1";

pub(crate) const INSERT_CHECKPOINT_SQL: &str = "INSERT INTO checkpoints \
    (thread_id, seq, created_at, node, step, owner, state_json) \
    VALUES ($1, $2, $3, $4, $5, $6, $7)";

pub(crate) const LOAD_LATEST_SQL: &str = "SELECT thread_id, seq, created_at, node, step, state_json \
    FROM checkpoints WHERE thread_id = $1 ORDER BY seq DESC LIMIT 1";

pub(crate) const LIST_CHECKPOINTS_SQL: &str = "SELECT seq, created_at, node, step \
    FROM checkpoints WHERE thread_id = $1 ORDER BY seq ASC";

pub(crate) const LIST_OWNED_LATEST_SQL: &str = "SELECT c.thread_id, c.seq, c.created_at, c.node, c.step, c.state_json \
    FROM checkpoints c \
    JOIN (SELECT thread_id, MAX(seq) AS seq FROM checkpoints WHERE owner = $1 GROUP BY thread_id) latest \
    ON c.thread_id = latest.thread_id AND c.seq = latest.seq \
    ORDER BY c.created_at DESC, c.thread_id ASC";

pub(crate) const COUNT_THREAD_SQL: &str = "SELECT COUNT(*) FROM checkpoints WHERE thread_id = $1";

pub(crate) const DELETE_THREAD_SQL: &str = "DELETE FROM checkpoints WHERE thread_id = $1";
