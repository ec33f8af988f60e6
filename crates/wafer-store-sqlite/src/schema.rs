//! SQL schema for the wafer SQLite store.
//!
//! Executed once at connection startup. Idempotent thanks to
//! `CREATE TABLE IF NOT EXISTS`; future migrations gate on `user_version`.

/// Full schema DDL.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS gpu_chip (
    chip_id               TEXT PRIMARY KEY,
    vendor                TEXT NOT NULL,   -- 'NVIDIA' | 'AMD' | 'INTEL'
    model_key             TEXT NOT NULL,   -- canonical identity key; write-once
    model_name            TEXT NOT NULL,
    brand_series          TEXT,
    code_name             TEXT,
    architecture          TEXT,
    compute_units_kind    TEXT,            -- 'SM' | 'CU' | 'Xe'
    compute_units_count   INTEGER,
    rt_cores              INTEGER,
    tensor_cores          INTEGER,
    base_clock_mhz        INTEGER,
    boost_clock_mhz       INTEGER,
    tdp_watts             INTEGER,
    recommended_psu_watts INTEGER,
    pcie_generation       INTEGER,
    pcie_lanes            INTEGER,
    created_at            TEXT NOT NULL,   -- ISO 8601 UTC
    UNIQUE (vendor, model_key)
);

CREATE TABLE IF NOT EXISTS gpu_memory (
    chip_id        TEXT PRIMARY KEY
                   REFERENCES gpu_chip(chip_id) ON DELETE CASCADE,
    vram_gb        INTEGER,
    memory_kind    TEXT,    -- 'GDDR6' | 'GDDR6X' | 'GDDR7'
    bus_width_bits INTEGER,
    speed_gbps     REAL,
    bandwidth_gbs  REAL
);

CREATE TABLE IF NOT EXISTS gpu_features (
    chip_id                 TEXT PRIMARY KEY
                            REFERENCES gpu_chip(chip_id) ON DELETE CASCADE,
    raytracing_hardware     INTEGER,
    raytracing_api          TEXT,
    cuda_compute_capability TEXT,
    dlss_version            TEXT,
    nvenc_generation        TEXT,
    nvidia_reflex           INTEGER,
    fsr_support             TEXT,
    fluid_motion_frames     INTEGER,
    hypr_rx                 INTEGER,
    xess_support            TEXT,
    av1_encode              INTEGER,
    av1_decode              INTEGER,
    resizable_bar           INTEGER
);

CREATE TABLE IF NOT EXISTS gpu_variant (
    variant_id          TEXT PRIMARY KEY,
    chip_id             TEXT NOT NULL
                        REFERENCES gpu_chip(chip_id) ON DELETE CASCADE,
    board_partner       TEXT NOT NULL,
    model_suffix        TEXT,
    part_number         TEXT,
    factory_boost_mhz   INTEGER,
    length_mm           INTEGER,
    width_slots         REAL,
    height_mm           INTEGER,
    power_connectors    TEXT,
    cooling             TEXT,    -- 'Air' | 'Liquid' | 'Hybrid'
    fan_count           INTEGER,
    displayport_count   INTEGER,
    displayport_version TEXT,
    hdmi_count          INTEGER,
    hdmi_version        TEXT,
    warranty_years      INTEGER,
    created_at          TEXT NOT NULL
);

-- Market observations are strictly append-only. The only write after insert
-- is the one-time variant linkage performed by the resolution engine.
CREATE TABLE IF NOT EXISTS market_observation (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    observation_id  TEXT NOT NULL UNIQUE,
    variant_id      TEXT
                    REFERENCES gpu_variant(variant_id) ON DELETE CASCADE,
    description     TEXT NOT NULL,
    description_key TEXT NOT NULL,
    retailer        TEXT NOT NULL,
    url             TEXT NOT NULL,
    sku             TEXT,
    price_eur       REAL NOT NULL CHECK (price_eur > 0),
    currency        TEXT NOT NULL,
    stock_status    TEXT NOT NULL,
    observed_at     TEXT NOT NULL,
    run_id          TEXT NOT NULL,
    recorded_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS product_hypothesis (
    hypothesis_id   TEXT PRIMARY KEY,
    description     TEXT NOT NULL,
    description_key TEXT NOT NULL,
    source          TEXT NOT NULL,
    run_id          TEXT NOT NULL,
    claims_json     TEXT NOT NULL,
    recorded_at     TEXT NOT NULL
);

-- The enrichment gate. First sighting wins; replays keep the original run.
CREATE TABLE IF NOT EXISTS enrichment_seen (
    fingerprint TEXT PRIMARY KEY,
    run_id      TEXT NOT NULL,
    marked_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS resolution_run (
    run_id                     TEXT PRIMARY KEY,
    started_at                 TEXT NOT NULL,
    finished_at                TEXT NOT NULL,
    scanned                    INTEGER NOT NULL,
    linked                     INTEGER NOT NULL,
    chips_created              INTEGER NOT NULL,
    variants_created           INTEGER NOT NULL,
    deferred_no_hypothesis     INTEGER NOT NULL,
    deferred_missing_identity  INTEGER NOT NULL,
    deferred_contradictory     INTEGER NOT NULL,
    deferred_ambiguous         INTEGER NOT NULL,
    rejected                   INTEGER NOT NULL,
    errors                     INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS chip_identity_idx
    ON gpu_chip(vendor, model_key);
CREATE INDEX IF NOT EXISTS variant_chip_idx
    ON gpu_variant(chip_id);
CREATE INDEX IF NOT EXISTS observation_variant_idx
    ON market_observation(variant_id);
CREATE INDEX IF NOT EXISTS observation_key_idx
    ON market_observation(description_key);
CREATE INDEX IF NOT EXISTS observation_run_idx
    ON market_observation(run_id);
CREATE INDEX IF NOT EXISTS hypothesis_key_idx
    ON product_hypothesis(description_key);

PRAGMA user_version = 1;
";
