pub const DROP_SCHEMA: &str = r#"
DROP TABLE IF EXISTS package_info;
DROP TABLE IF EXISTS packages;
DROP TABLE IF EXISTS popcon;
DROP TABLE IF EXISTS meta;
"#;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS packages (
    pack_id INTEGER PRIMARY KEY AUTOINCREMENT,
    arch TEXT NOT NULL,
    release TEXT NOT NULL,
    package TEXT NOT NULL,
    UNIQUE (arch, release, package)
);

CREATE INDEX IF NOT EXISTS idx_packages_package ON packages(package);

CREATE TABLE IF NOT EXISTS package_info (
    pack_id INTEGER NOT NULL UNIQUE REFERENCES packages(pack_id),
    size INTEGER,
    filename TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS popcon (
    package TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    num_installs INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
