pub const SCHEMA: &str = r#"
-- Images table: one row per scored photo, written by the scoring pipeline
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER,
    file_path TEXT NOT NULL,
    file_name TEXT NOT NULL,
    file_type TEXT,

    -- Quality scores, each conventionally in [0,1]
    score REAL,
    score_general REAL,
    score_technical REAL,
    score_aesthetic REAL,
    score_spaq REAL,
    score_ava REAL,
    score_koniq REAL,
    score_paq2piq REAL,
    score_liqe REAL,

    -- User-editable fields
    keywords TEXT,            -- comma-separated tag list
    title TEXT,
    description TEXT,
    rating INTEGER DEFAULT 0, -- 0-5
    label TEXT,               -- Red/Yellow/Green/Blue/Purple or NULL

    -- Pipeline bookkeeping
    metadata TEXT,
    thumbnail_path TEXT,
    scores_json TEXT,
    model_version TEXT,
    image_hash TEXT,

    -- Grouping
    folder_id INTEGER,        -- nullable FK into folders
    stack_id INTEGER,         -- nullable burst-stack grouping key
    burst_uuid TEXT,          -- opaque burst identifier, independent of stack

    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,

    FOREIGN KEY (folder_id) REFERENCES folders(id)
);

-- Indexes for the listing paths
CREATE INDEX IF NOT EXISTS idx_images_folder ON images(folder_id);
CREATE INDEX IF NOT EXISTS idx_images_stack ON images(stack_id);
CREATE INDEX IF NOT EXISTS idx_images_score_general ON images(score_general);
CREATE INDEX IF NOT EXISTS idx_images_rating ON images(rating);
CREATE INDEX IF NOT EXISTS idx_images_created_at ON images(created_at);

-- Folders: hierarchical containers, parent graph forms a forest
CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    parent_id INTEGER,        -- NULL for roots
    is_fully_scored INTEGER DEFAULT 0,
    FOREIGN KEY (parent_id) REFERENCES folders(id)
);

CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id);

-- Platform-specific path overrides, at most one per (image, path_type)
CREATE TABLE IF NOT EXISTS file_paths (
    image_id INTEGER NOT NULL,
    path_type TEXT NOT NULL,  -- e.g. 'WIN'
    path TEXT NOT NULL,
    PRIMARY KEY (image_id, path_type),
    FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE
);
"#;

// The stack_cache table is deliberately absent here: it is created lazily
// and owned by StackCacheManager (see db/stacks.rs).

pub const MIGRATIONS: &[&str] = &[
    // Older pipeline databases predate burst grouping
    "ALTER TABLE images ADD COLUMN burst_uuid TEXT",
    "ALTER TABLE images ADD COLUMN scores_json TEXT",
];
