//! Table definitions. Every table shares the same identity and audit columns; each definition only
//! lists what's specific to it.

/// A column declaration, as it appears inside `CREATE TABLE`.
#[derive(Clone, Copy, Debug)]
pub struct Column {
    pub name: &'static str,
    pub decl: &'static str,
}

const fn col(name: &'static str, decl: &'static str) -> Column {
    Column { name, decl }
}

#[derive(Debug)]
pub struct Table {
    pub name: &'static str,
    /// Census blocks are keyed by their GEOID; everything else uses an integer.
    pub text_id: bool,
    pub fields: &'static [Column],
    /// Extra table constraints, like `UNIQUE (...)` or `CHECK (...)`
    pub constraints: &'static [&'static str],
    pub indices: &'static [&'static str],
}

/// The columns every persisted record carries.
pub const PERSISTABLE: [&str; 3] = ["id", "created_at", "modified_at"];

impl Table {
    pub fn has_column(&self, name: &str) -> bool {
        PERSISTABLE.contains(&name) || self.fields.iter().any(|c| c.name == name)
    }

    /// Every column name, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        PERSISTABLE
            .iter()
            .copied()
            .chain(self.fields.iter().map(|c| c.name))
    }

    pub fn create_sql(&self) -> String {
        let mut lines = vec![
            format!(
                "id {} PRIMARY KEY",
                if self.text_id { "TEXT" } else { "INTEGER" }
            ),
            "created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP".to_string(),
            "modified_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP".to_string(),
        ];
        for c in self.fields {
            lines.push(format!("{} {}", quote(c.name), c.decl));
        }
        for c in self.constraints {
            lines.push(c.to_string());
        }
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n);\n",
            self.name,
            lines.join(",\n  ")
        );
        for idx in self.indices {
            sql.push_str(idx);
            sql.push_str(";\n");
        }
        sql
    }
}

/// Quotes an identifier. `use` is a column name and also a keyword.
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub static TAZS: Table = Table {
    name: "tazs",
    text_id: false,
    fields: &[
        col("name", "TEXT NOT NULL UNIQUE"),
        // WKT MULTIPOLYGON
        col("geometry", "TEXT"),
    ],
    constraints: &[],
    indices: &[],
};

pub static LOCATIONS: Table = Table {
    name: "locations",
    text_id: false,
    fields: &[
        col("parcel_id", "TEXT NOT NULL"),
        col("taz_id", "INTEGER NOT NULL"),
        col("lat", "REAL"),
        col("long", "REAL"),
        // WKT POINT
        col("coordinates", "TEXT"),
        col("parcel_type", "TEXT"),
        col("use", "TEXT"),
        col("zone_type", "TEXT"),
        col("city", "TEXT"),
        col("census_block_geoid", "TEXT"),
        col("weight", "REAL NOT NULL DEFAULT 1"),
        col("residential", "INTEGER NOT NULL DEFAULT 0"),
    ],
    constraints: &["UNIQUE (parcel_id, taz_id)"],
    indices: &["CREATE INDEX IF NOT EXISTS ix_locations_taz_id ON locations (taz_id)"],
};

pub static HOUSEHOLDS: Table = Table {
    name: "households",
    text_id: false,
    fields: &[col(
        "location_id",
        "INTEGER NOT NULL REFERENCES locations (id) ON DELETE CASCADE",
    )],
    constraints: &[],
    indices: &["CREATE INDEX IF NOT EXISTS ix_households_location_id ON households (location_id)"],
};

pub static PERSONS: Table = Table {
    name: "persons",
    text_id: false,
    fields: &[col(
        "household_id",
        "INTEGER NOT NULL REFERENCES households (id) ON DELETE CASCADE",
    )],
    constraints: &[],
    indices: &["CREATE INDEX IF NOT EXISTS ix_person_household_id ON persons (household_id)"],
};

pub static TRIPS: Table = Table {
    name: "trips",
    text_id: false,
    fields: &[
        col(
            "person_id",
            "INTEGER NOT NULL REFERENCES persons (id) ON DELETE CASCADE",
        ),
        col("trip_leg", "INTEGER NOT NULL"),
        // Seconds after midnight
        col("departure", "REAL NOT NULL"),
        col(
            "origin_location_id",
            "INTEGER NOT NULL REFERENCES locations (id)",
        ),
        col(
            "destination_location_id",
            "INTEGER NOT NULL REFERENCES locations (id)",
        ),
    ],
    constraints: &["UNIQUE (person_id, trip_leg)"],
    indices: &[],
};

pub static NODES: Table = Table {
    name: "nodes",
    text_id: false,
    fields: &[
        // Longitude and latitude, already unprojected from the network's UTM coordinates
        col("x", "REAL NOT NULL"),
        col("y", "REAL NOT NULL"),
        // WKT POINT
        col("coordinates", "TEXT NOT NULL"),
    ],
    constraints: &[],
    indices: &[],
};

pub static LINKS: Table = Table {
    name: "links",
    text_id: false,
    fields: &[
        col("from_node_id", "INTEGER NOT NULL REFERENCES nodes (id)"),
        col("to_node_id", "INTEGER NOT NULL REFERENCES nodes (id)"),
    ],
    constraints: &[],
    indices: &[
        "CREATE INDEX IF NOT EXISTS ix_links_from_node_id ON links (from_node_id)",
        "CREATE INDEX IF NOT EXISTS ix_links_to_node_id ON links (to_node_id)",
    ],
};

pub static CENSUS_BLOCK: Table = Table {
    name: "census_block",
    text_id: true,
    fields: &[
        col("state_code", "TEXT NOT NULL"),
        col("county_code", "TEXT NOT NULL"),
        col("tract_code", "TEXT NOT NULL"),
        col("block_code", "TEXT NOT NULL"),
        col("total_population", "INTEGER NOT NULL"),
        col("total_households", "INTEGER NOT NULL"),
        col("pct_m", "REAL NOT NULL"),
        col("pct_f", "REAL NOT NULL"),
        col("pct_family_household", "REAL NOT NULL"),
    ],
    constraints: &["UNIQUE (state_code, county_code, tract_code, block_code)"],
    indices: &[],
};

pub static CENSUS_BLOCK_AGE: Table = Table {
    name: "census_block_age",
    text_id: false,
    fields: &[
        col("block_id", "TEXT NOT NULL REFERENCES census_block (id)"),
        col("pct", "REAL NOT NULL"),
        col("count", "INTEGER NOT NULL"),
        col("pct_veteran", "REAL NOT NULL"),
        col("lower_bound", "INTEGER NOT NULL"),
        col("upper_bound", "INTEGER NOT NULL"),
        col("sex", "TEXT NOT NULL"),
    ],
    constraints: &[
        "CHECK (pct BETWEEN 0 AND 1)",
        "CHECK (pct_veteran BETWEEN 0 AND 1)",
        "CHECK (sex IN ('M', 'F'))",
        "UNIQUE (block_id, sex, lower_bound)",
    ],
    indices: &[],
};

pub static CENSUS_BLOCK_HOUSEHOLD: Table = Table {
    name: "census_block_household",
    text_id: false,
    fields: &[
        col("block_id", "TEXT NOT NULL REFERENCES census_block (id)"),
        col("pct_family_household", "REAL NOT NULL"),
        col("pct_nonfamily_household", "REAL NOT NULL"),
        col("pct_nonfamily_alone", "REAL NOT NULL"),
    ],
    constraints: &[
        "CHECK (pct_family_household BETWEEN 0 AND 1)",
        "CHECK (abs(pct_family_household + pct_nonfamily_household - 1) < 1e-6)",
        "UNIQUE (block_id)",
    ],
    indices: &[],
};

pub static CENSUS_BLOCK_ECONOMICS: Table = Table {
    name: "census_block_economics",
    text_id: false,
    fields: &[
        col("block_id", "TEXT NOT NULL REFERENCES census_block (id)"),
        col("pct", "REAL NOT NULL"),
        col("household_income_lower_bound", "INTEGER NOT NULL"),
        col("household_income_upper_bound", "INTEGER NOT NULL"),
    ],
    constraints: &[
        "CHECK (pct BETWEEN 0 AND 1)",
        "UNIQUE (block_id, household_income_lower_bound, household_income_upper_bound)",
    ],
    indices: &[],
};

pub static METRICS: Table = Table {
    name: "metrics",
    text_id: false,
    fields: &[
        col("domain", "TEXT NOT NULL"),
        col("name", "TEXT NOT NULL"),
        col("description", "TEXT NOT NULL"),
        col("provenance", "TEXT NOT NULL"),
        // JSON
        col("data", "TEXT"),
        col("export_hooks", "TEXT NOT NULL DEFAULT '[]'"),
    ],
    constraints: &["UNIQUE (domain, name)"],
    indices: &[],
};

/// In dependency order
pub static ALL_TABLES: [&Table; 12] = [
    &TAZS,
    &LOCATIONS,
    &HOUSEHOLDS,
    &PERSONS,
    &TRIPS,
    &NODES,
    &LINKS,
    &CENSUS_BLOCK,
    &CENSUS_BLOCK_AGE,
    &CENSUS_BLOCK_HOUSEHOLD,
    &CENSUS_BLOCK_ECONOMICS,
    &METRICS,
];

/// The line between both endpoints of every link.
pub const LINK_GEOMETRIES_VIEW: &str = "CREATE VIEW IF NOT EXISTS link_geometries AS
SELECT
  links.id AS link_id,
  links.from_node_id,
  links.to_node_id,
  'LINESTRING(' || f.x || ' ' || f.y || ', ' || t.x || ' ' || t.y || ')' AS geometry
FROM links
JOIN nodes f ON links.from_node_id = f.id
JOIN nodes t ON links.to_node_id = t.id;
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_columns_come_first() {
        let columns: Vec<&str> = HOUSEHOLDS.columns().collect();
        assert_eq!(vec!["id", "created_at", "modified_at", "location_id"], columns);
        assert!(LOCATIONS.has_column("use"));
        assert!(!LOCATIONS.has_column("agg.taz"));
        assert!(CENSUS_BLOCK.create_sql().contains("id TEXT PRIMARY KEY"));
    }
}
