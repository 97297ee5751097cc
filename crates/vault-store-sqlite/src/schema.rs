//! SQL schema for the vault SQLite store.
//!
//! Executed at connection startup and again by the import whenever a known
//! table has gone missing. Every statement is idempotent. Foreign keys are
//! switched on by the connection, not here, so re-running the schema in the
//! middle of an import leaves enforcement as the import set it.

/// Every table the import writes to or reads from.
pub const KNOWN_TABLES: &[&str] = &[
  "source_systems",
  "persons",
  "contacts",
  "departments",
  "locations",
  "cost_centers",
  "cost_bearers",
  "employers",
  "teams",
  "divisions",
  "titles",
  "organizations",
  "contracts",
  "custom_field_schemas",
  "custom_field_values",
  "primary_contract_config",
  "preferences",
];

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS source_systems (
    system_id          TEXT PRIMARY KEY,
    display_name       TEXT,
    identification_key TEXT
);

CREATE TABLE IF NOT EXISTS persons (
    person_id                  TEXT PRIMARY KEY,
    external_id                TEXT NOT NULL UNIQUE,
    display_name               TEXT,
    given_name                 TEXT,
    family_name                TEXT,
    initials                   TEXT,
    user_name                  TEXT,
    gender                     TEXT,
    birth_date                 TEXT,            -- YYYY-MM-DD
    is_excluded                INTEGER NOT NULL DEFAULT 0,
    is_blocked                 INTEGER NOT NULL DEFAULT 0,
    source                     TEXT NOT NULL REFERENCES source_systems(system_id),
    primary_manager_person_id  TEXT REFERENCES persons(person_id),
    primary_manager_source     TEXT,            -- 'contract' | 'department' | 'import'
    primary_manager_updated_at TEXT             -- RFC 3339 UTC
);

CREATE TABLE IF NOT EXISTS contacts (
    person_id    TEXT NOT NULL REFERENCES persons(person_id),
    contact_type TEXT NOT NULL,                 -- 'personal' | 'business'
    email        TEXT,
    phone_mobile TEXT,
    phone_fixed  TEXT,
    street       TEXT,
    house_number TEXT,
    postal_code  TEXT,
    locality     TEXT,
    country      TEXT,
    PRIMARY KEY (person_id, contact_type)
);

-- Parents live in the same source as their children.
CREATE TABLE IF NOT EXISTS departments (
    external_id        TEXT NOT NULL,
    source             TEXT NOT NULL REFERENCES source_systems(system_id),
    display_name       TEXT,
    code               TEXT,
    parent_external_id TEXT,
    manager_person_id  TEXT REFERENCES persons(person_id),
    PRIMARY KEY (external_id, source),
    FOREIGN KEY (parent_external_id, source) REFERENCES departments(external_id, source)
);

CREATE TABLE IF NOT EXISTS locations (
    external_id TEXT NOT NULL,
    source      TEXT NOT NULL REFERENCES source_systems(system_id),
    code        TEXT,
    name        TEXT,
    PRIMARY KEY (external_id, source)
);

CREATE TABLE IF NOT EXISTS cost_centers (
    external_id TEXT NOT NULL,
    source      TEXT NOT NULL REFERENCES source_systems(system_id),
    code        TEXT,
    name        TEXT,
    PRIMARY KEY (external_id, source)
);

CREATE TABLE IF NOT EXISTS cost_bearers (
    external_id TEXT NOT NULL,
    source      TEXT NOT NULL REFERENCES source_systems(system_id),
    code        TEXT,
    name        TEXT,
    PRIMARY KEY (external_id, source)
);

CREATE TABLE IF NOT EXISTS employers (
    external_id TEXT NOT NULL,
    source      TEXT NOT NULL REFERENCES source_systems(system_id),
    code        TEXT,
    name        TEXT,
    PRIMARY KEY (external_id, source)
);

CREATE TABLE IF NOT EXISTS teams (
    external_id TEXT NOT NULL,
    source      TEXT NOT NULL REFERENCES source_systems(system_id),
    code        TEXT,
    name        TEXT,
    PRIMARY KEY (external_id, source)
);

CREATE TABLE IF NOT EXISTS divisions (
    external_id TEXT NOT NULL,
    source      TEXT NOT NULL REFERENCES source_systems(system_id),
    code        TEXT,
    name        TEXT,
    PRIMARY KEY (external_id, source)
);

CREATE TABLE IF NOT EXISTS titles (
    external_id TEXT NOT NULL,
    source      TEXT NOT NULL REFERENCES source_systems(system_id),
    code        TEXT,
    name        TEXT,
    PRIMARY KEY (external_id, source)
);

CREATE TABLE IF NOT EXISTS organizations (
    external_id TEXT NOT NULL,
    source      TEXT NOT NULL REFERENCES source_systems(system_id),
    code        TEXT,
    name        TEXT,
    PRIMARY KEY (external_id, source)
);

-- Every reference is an (external_id, source) pair; the same external id may
-- exist independently in several source systems.
CREATE TABLE IF NOT EXISTS contracts (
    external_id                  TEXT PRIMARY KEY,
    person_id                    TEXT NOT NULL REFERENCES persons(person_id),
    source                       TEXT NOT NULL REFERENCES source_systems(system_id),
    start_date                   TEXT,
    end_date                     TEXT,
    type_code                    TEXT,
    type_description             TEXT,
    fte                          REAL,
    hours_per_week               REAL,
    percentage                   REAL,
    sequence                     INTEGER,
    manager_person_external_id   TEXT,
    location_external_id         TEXT,
    location_source              TEXT,
    department_external_id       TEXT,
    department_source            TEXT,
    cost_center_external_id      TEXT,
    cost_center_source           TEXT,
    cost_bearer_external_id      TEXT,
    cost_bearer_source           TEXT,
    employer_external_id         TEXT,
    employer_source              TEXT,
    team_external_id             TEXT,
    team_source                  TEXT,
    division_external_id         TEXT,
    division_source              TEXT,
    title_external_id            TEXT,
    title_source                 TEXT,
    organization_external_id     TEXT,
    organization_source          TEXT,
    FOREIGN KEY (location_external_id, location_source)         REFERENCES locations(external_id, source),
    FOREIGN KEY (department_external_id, department_source)     REFERENCES departments(external_id, source),
    FOREIGN KEY (cost_center_external_id, cost_center_source)   REFERENCES cost_centers(external_id, source),
    FOREIGN KEY (cost_bearer_external_id, cost_bearer_source)   REFERENCES cost_bearers(external_id, source),
    FOREIGN KEY (employer_external_id, employer_source)         REFERENCES employers(external_id, source),
    FOREIGN KEY (team_external_id, team_source)                 REFERENCES teams(external_id, source),
    FOREIGN KEY (division_external_id, division_source)         REFERENCES divisions(external_id, source),
    FOREIGN KEY (title_external_id, title_source)               REFERENCES titles(external_id, source),
    FOREIGN KEY (organization_external_id, organization_source) REFERENCES organizations(external_id, source)
);

CREATE TABLE IF NOT EXISTS custom_field_schemas (
    table_name   TEXT NOT NULL,                 -- 'persons' | 'contracts'
    field_key    TEXT NOT NULL,
    display_name TEXT NOT NULL,
    PRIMARY KEY (table_name, field_key)
);

-- One JSON object of text values per owning row.
CREATE TABLE IF NOT EXISTS custom_field_values (
    table_name  TEXT NOT NULL,
    entity_id   TEXT NOT NULL,
    fields_json TEXT NOT NULL DEFAULT '{}',
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (table_name, entity_id)
);

CREATE TABLE IF NOT EXISTS primary_contract_config (
    field_name     TEXT PRIMARY KEY,
    sort_order     TEXT NOT NULL DEFAULT 'DESC',  -- 'ASC' | 'DESC'
    priority_order INTEGER NOT NULL,
    is_active      INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS preferences (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS contracts_person_idx     ON contracts(person_id);
CREATE INDEX IF NOT EXISTS departments_external_idx ON departments(external_id);

-- Seed the default cascade only into an empty table.
INSERT INTO primary_contract_config (field_name, sort_order, priority_order, is_active)
SELECT column1, column2, column3, column4
FROM (VALUES ('fte', 'DESC', 1, 1),
             ('hours_per_week', 'DESC', 2, 1),
             ('start_date', 'ASC', 3, 1))
WHERE NOT EXISTS (SELECT 1 FROM primary_contract_config);

PRAGMA user_version = 1;
";
