//! Postgres system catalogs.
//!
//! Clients probe these tables and settings before running anything useful.
//! Every table here is static reference data, except `pg_database` which
//! reports the database the session connected to. Tables without rows signal
//! that no objects of that kind exist.
//!
//! The catalog is engine agnostic. Backends decide how to make the tables and
//! functions queryable.
use crate::backend::{SessionInfo, Value};

/// Version reported to clients.
pub const SERVER_VERSION: &str = "13.0.0";

/// Schema catalog tables are installed into.
pub const POSTGRES_SCHEMA: &str = "pg_catalog";

/// Default schema users see.
pub const DEFAULT_SCHEMA: &str = "public";

/// Oid of the bootstrap superuser that owns everything.
const BOOTSTRAP_SUPERUSER_ID: i64 = 10;

/// Oid of `pg_namespace` in `pg_class`, used by descriptions of schemas.
const PG_NAMESPACE_CLASS_ID: i64 = 2615;

/// Oid reported for the session's database.
const DATABASE_OID: i64 = 16384;

const TYPE_OID_VARCHAR: i64 = 1043;
const TYPE_OID_NUMERIC: i64 = 1700;

/// Size of the varlena header included in typmods.
const VARHDRSZ: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: &'static str,
    pub typ: ColumnType,
}

impl CatalogColumn {
    pub fn from_tuples<I>(tuples: I) -> Vec<CatalogColumn>
    where
        I: IntoIterator<Item = (&'static str, ColumnType)>,
    {
        tuples
            .into_iter()
            .map(|(name, typ)| CatalogColumn { name, typ })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum TableRows {
    Static(Vec<Vec<Value>>),
    /// A single row describing the session's database.
    SessionDatabase,
}

/// A catalog table.
#[derive(Debug, Clone)]
pub struct CatalogTable {
    pub name: &'static str,
    pub columns: Vec<CatalogColumn>,
    rows: TableRows,
}

impl CatalogTable {
    /// Rows as seen by a session.
    pub fn rows(&self, info: &SessionInfo) -> Vec<Vec<Value>> {
        match &self.rows {
            TableRows::Static(rows) => rows.clone(),
            TableRows::SessionDatabase => vec![database_row(&info.database)],
        }
    }
}

/// A runtime setting, queryable through `pg_settings` and `SHOW`.
#[derive(Debug, Clone)]
pub struct Setting {
    pub name: &'static str,
    pub value: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub vartype: &'static str,
    /// Sent as a ParameterStatus message on startup.
    pub reported: bool,
}

/// A builtin type.
#[derive(Debug, Clone)]
pub struct PgType {
    pub oid: i64,
    pub name: &'static str,
    /// Name as printed by `format_type`.
    pub display_name: &'static str,
    pub len: i64,
    pub byval: bool,
    pub typtype: &'static str,
    pub category: &'static str,
    pub preferred: bool,
    pub array_oid: i64,
    /// Prefix of the io functions, e.g. `int4` for `int4in`.
    pub io_prefix: &'static str,
    /// Prefix of the typmod io functions, if the type takes a modifier.
    pub typmod_prefix: Option<&'static str>,
    pub align: &'static str,
    pub storage: &'static str,
    pub collation: i64,
}

impl PgType {
    fn row(&self) -> Vec<Value> {
        let io = |suffix: &str| Value::Text(format!("{}{}", self.io_prefix, suffix));
        let typmod_io = |suffix: &str| match self.typmod_prefix {
            Some(prefix) => Value::Text(format!("{prefix}{suffix}")),
            None => text("-"),
        };
        let analyze = if self.typtype == "r" {
            text("range_typanalyze")
        } else {
            text("-")
        };

        vec![
            int(self.oid),
            text(self.name),
            int(11), // pg_catalog
            int(BOOTSTRAP_SUPERUSER_ID),
            int(self.len),
            flag(self.byval),
            text(self.typtype),
            text(self.category),
            flag(self.preferred),
            flag(true),
            text(","),
            int(0),
            int(0),
            int(self.array_oid),
            io("in"),
            io("out"),
            io("recv"),
            io("send"),
            typmod_io("typmodin"),
            typmod_io("typmodout"),
            analyze,
            text(self.align),
            text(self.storage),
            flag(false),
            int(0),
            int(-1),
            int(0),
            int(self.collation),
            Value::Null,
            Value::Null,
            Value::Null,
        ]
    }
}

/// Immutable set of catalog tables, settings and types.
#[derive(Debug, Clone)]
pub struct Catalog {
    server_version: &'static str,
    settings: Vec<Setting>,
    types: Vec<PgType>,
    tables: Vec<CatalogTable>,
}

impl Catalog {
    /// Catalog mimicking a stock Postgres 13 server.
    pub fn postgres() -> Catalog {
        let settings = builtin_settings();
        let types = builtin_types();
        let tables = vec![
            pg_namespace(),
            pg_description(),
            pg_database(),
            pg_settings(&settings),
            pg_type(&types),
            pg_class(),
            pg_range(),
        ];

        Catalog {
            server_version: SERVER_VERSION,
            settings,
            types,
            tables,
        }
    }

    /// Text returned by `version()`.
    pub fn version(&self) -> String {
        format!(
            "PostgreSQL {} (litegres {})",
            self.server_version,
            env!("CARGO_PKG_VERSION")
        )
    }

    pub fn tables(&self) -> &[CatalogTable] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&CatalogTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn settings(&self) -> &[Setting] {
        &self.settings
    }

    /// Look up a setting, ignoring case.
    pub fn setting(&self, name: &str) -> Option<&Setting> {
        self.settings
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Settings sent as ParameterStatus messages during startup.
    pub fn startup_parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.settings
            .iter()
            .filter(|s| s.reported)
            .map(|s| (s.name, s.value))
    }

    pub fn pg_type(&self, oid: i64) -> Option<&PgType> {
        self.types.iter().find(|t| t.oid == oid)
    }

    /// Display name for a type with an optional type modifier.
    pub fn format_type(&self, oid: i64, typmod: Option<i64>) -> String {
        let typ = match self.pg_type(oid) {
            Some(typ) => typ,
            None => return "???".to_string(),
        };
        let typmod = typmod.filter(|m| *m >= VARHDRSZ).map(|m| m - VARHDRSZ);

        match (typ.oid, typmod) {
            (TYPE_OID_VARCHAR, Some(len)) => format!("{}({len})", typ.display_name),
            (TYPE_OID_NUMERIC, Some(m)) => {
                let precision = (m >> 16) & 0xffff;
                let scale = m & 0xffff;
                format!("{}({precision},{scale})", typ.display_name)
            }
            _ => typ.display_name.to_string(),
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::postgres()
    }
}

fn int(v: i64) -> Value {
    Value::Integer(v)
}

fn flag(v: bool) -> Value {
    Value::Integer(v as i64)
}

fn text(v: &str) -> Value {
    Value::Text(v.to_string())
}

fn database_row(name: &str) -> Vec<Value> {
    vec![
        int(DATABASE_OID),
        text(name),
        int(BOOTSTRAP_SUPERUSER_ID),
        int(6), // UTF8
        text("en_US.UTF-8"),
        text("en_US.UTF-8"),
        flag(false),
        flag(true),
        int(-1),
        int(13441),
        int(478),
        int(1),
        int(1663), // pg_default tablespace
        Value::Null,
    ]
}

fn pg_namespace() -> CatalogTable {
    let ns = |oid: i64, name: &str| {
        vec![int(oid), text(name), int(BOOTSTRAP_SUPERUSER_ID), text("")]
    };
    CatalogTable {
        name: "pg_namespace",
        columns: CatalogColumn::from_tuples([
            ("oid", ColumnType::Integer),
            ("nspname", ColumnType::Text),
            ("nspowner", ColumnType::Integer),
            ("nspacl", ColumnType::Text),
        ]),
        rows: TableRows::Static(vec![
            ns(99, "pg_toast"),
            ns(11, POSTGRES_SCHEMA),
            ns(2200, DEFAULT_SCHEMA),
            ns(13427, "information_schema"),
        ]),
    }
}

fn pg_description() -> CatalogTable {
    let desc = |oid: i64, description: &str| {
        vec![int(oid), int(PG_NAMESPACE_CLASS_ID), int(0), text(description)]
    };
    CatalogTable {
        name: "pg_description",
        columns: CatalogColumn::from_tuples([
            ("objoid", ColumnType::Integer),
            ("classoid", ColumnType::Integer),
            ("objsubid", ColumnType::Integer),
            ("description", ColumnType::Text),
        ]),
        rows: TableRows::Static(vec![
            desc(11, "system catalog schema"),
            desc(99, "reserved schema for TOAST tables"),
            desc(2200, "standard public schema"),
        ]),
    }
}

fn pg_database() -> CatalogTable {
    CatalogTable {
        name: "pg_database",
        columns: CatalogColumn::from_tuples([
            ("oid", ColumnType::Integer),
            ("datname", ColumnType::Text),
            ("datdba", ColumnType::Integer),
            ("encoding", ColumnType::Integer),
            ("datcollate", ColumnType::Text),
            ("datctype", ColumnType::Text),
            ("datistemplate", ColumnType::Integer),
            ("datallowconn", ColumnType::Integer),
            ("datconnlimit", ColumnType::Integer),
            ("datlastsysoid", ColumnType::Integer),
            ("datfrozenxid", ColumnType::Integer),
            ("datminmxid", ColumnType::Integer),
            ("dattablespace", ColumnType::Integer),
            ("datacl", ColumnType::Text),
        ]),
        rows: TableRows::SessionDatabase,
    }
}

fn pg_settings(settings: &[Setting]) -> CatalogTable {
    let rows = settings
        .iter()
        .map(|s| {
            vec![
                text(s.name),
                text(s.value),
                Value::Null,
                text(s.category),
                text(s.description),
                Value::Null,
                text("user"),
                text(s.vartype),
                text("default"),
                Value::Null,
                Value::Null,
                Value::Null,
                text(s.value),
                text(s.value),
                Value::Null,
                Value::Null,
                flag(false),
            ]
        })
        .collect();

    CatalogTable {
        name: "pg_settings",
        columns: CatalogColumn::from_tuples([
            ("name", ColumnType::Text),
            ("setting", ColumnType::Text),
            ("unit", ColumnType::Text),
            ("category", ColumnType::Text),
            ("short_desc", ColumnType::Text),
            ("extra_desc", ColumnType::Text),
            ("context", ColumnType::Text),
            ("vartype", ColumnType::Text),
            ("source", ColumnType::Text),
            ("min_val", ColumnType::Text),
            ("max_val", ColumnType::Text),
            ("enumvals", ColumnType::Text),
            ("boot_val", ColumnType::Text),
            ("reset_val", ColumnType::Text),
            ("sourcefile", ColumnType::Text),
            ("sourceline", ColumnType::Integer),
            ("pending_restart", ColumnType::Integer),
        ]),
        rows: TableRows::Static(rows),
    }
}

fn pg_type(types: &[PgType]) -> CatalogTable {
    CatalogTable {
        name: "pg_type",
        columns: CatalogColumn::from_tuples([
            ("oid", ColumnType::Integer),
            ("typname", ColumnType::Text),
            ("typnamespace", ColumnType::Integer),
            ("typowner", ColumnType::Integer),
            ("typlen", ColumnType::Integer),
            ("typbyval", ColumnType::Integer),
            ("typtype", ColumnType::Text),
            ("typcategory", ColumnType::Text),
            ("typispreferred", ColumnType::Integer),
            ("typisdefined", ColumnType::Integer),
            ("typdelim", ColumnType::Text),
            ("typrelid", ColumnType::Integer),
            ("typelem", ColumnType::Integer),
            ("typarray", ColumnType::Integer),
            ("typinput", ColumnType::Text),
            ("typoutput", ColumnType::Text),
            ("typreceive", ColumnType::Text),
            ("typsend", ColumnType::Text),
            ("typmodin", ColumnType::Text),
            ("typmodout", ColumnType::Text),
            ("typanalyze", ColumnType::Text),
            ("typalign", ColumnType::Text),
            ("typstorage", ColumnType::Text),
            ("typnotnull", ColumnType::Integer),
            ("typbasetype", ColumnType::Integer),
            ("typtypmod", ColumnType::Integer),
            ("typndims", ColumnType::Integer),
            ("typcollation", ColumnType::Integer),
            ("typdefaultbin", ColumnType::Text),
            ("typdefault", ColumnType::Text),
            ("typacl", ColumnType::Text),
        ]),
        rows: TableRows::Static(types.iter().map(PgType::row).collect()),
    }
}

fn pg_class() -> CatalogTable {
    CatalogTable {
        name: "pg_class",
        columns: CatalogColumn::from_tuples([
            ("oid", ColumnType::Integer),
            ("relname", ColumnType::Text),
            ("relnamespace", ColumnType::Integer),
            ("reltype", ColumnType::Integer),
            ("reloftype", ColumnType::Integer),
            ("relowner", ColumnType::Integer),
            ("relam", ColumnType::Integer),
            ("relfilenode", ColumnType::Integer),
            ("reltablespace", ColumnType::Integer),
            ("relpages", ColumnType::Integer),
            ("reltuples", ColumnType::Real),
            ("relallvisible", ColumnType::Integer),
            ("reltoastrelid", ColumnType::Integer),
            ("relhasindex", ColumnType::Integer),
            ("relisshared", ColumnType::Integer),
            ("relpersistence", ColumnType::Text),
            ("relkind", ColumnType::Text),
            ("relnatts", ColumnType::Integer),
            ("relchecks", ColumnType::Integer),
            ("relhasrules", ColumnType::Integer),
            ("relhastriggers", ColumnType::Integer),
            ("relhassubclass", ColumnType::Integer),
            ("relrowsecurity", ColumnType::Integer),
            ("relforcerowsecurity", ColumnType::Integer),
            ("relispopulated", ColumnType::Integer),
            ("relreplident", ColumnType::Text),
            ("relispartition", ColumnType::Integer),
            ("relrewrite", ColumnType::Integer),
            ("relfrozenxid", ColumnType::Integer),
            ("relminmxid", ColumnType::Integer),
            ("relacl", ColumnType::Text),
            ("reloptions", ColumnType::Text),
            ("relpartbound", ColumnType::Text),
        ]),
        rows: TableRows::Static(Vec::new()),
    }
}

fn pg_range() -> CatalogTable {
    let range = |typid: i64, subtype: i64, multitypid: i64, subopc: i64| {
        vec![
            int(typid),
            int(subtype),
            int(multitypid),
            int(0),
            int(subopc),
            text(""),
            text(""),
        ]
    };
    CatalogTable {
        name: "pg_range",
        columns: CatalogColumn::from_tuples([
            ("rngtypid", ColumnType::Integer),
            ("rngsubtype", ColumnType::Integer),
            ("rngmultitypid", ColumnType::Integer),
            ("rngcollation", ColumnType::Integer),
            ("rngsubopc", ColumnType::Integer),
            ("rngcanonical", ColumnType::Text),
            ("rngsubdiff", ColumnType::Text),
        ]),
        rows: TableRows::Static(vec![
            range(3904, 23, 4451, 1978),
            range(3906, 1700, 4532, 3125),
            range(3908, 1114, 4533, 3128),
            range(3910, 1184, 4534, 3127),
            range(3912, 1082, 4535, 3122),
            range(3926, 20, 4536, 3124),
        ]),
    }
}

fn builtin_settings() -> Vec<Setting> {
    let setting = |name, value, category, description, vartype, reported| Setting {
        name,
        value,
        category,
        description,
        vartype,
        reported,
    };
    vec![
        setting(
            "server_version",
            SERVER_VERSION,
            "Preset Options",
            "Shows the server version.",
            "string",
            true,
        ),
        setting(
            "server_encoding",
            "UTF8",
            "Client Connection Defaults / Locale and Formatting",
            "Sets the server (database) character set encoding.",
            "string",
            true,
        ),
        setting(
            "client_encoding",
            "UTF8",
            "Client Connection Defaults / Locale and Formatting",
            "Sets the client's character set encoding.",
            "string",
            true,
        ),
        setting(
            "DateStyle",
            "ISO, MDY",
            "Client Connection Defaults / Locale and Formatting",
            "Sets the display format for date and time values.",
            "string",
            true,
        ),
        setting(
            "TimeZone",
            "UTC",
            "Client Connection Defaults / Locale and Formatting",
            "Sets the time zone for displaying and interpreting time stamps.",
            "string",
            true,
        ),
        setting(
            "integer_datetimes",
            "on",
            "Preset Options",
            "Datetimes are integer based.",
            "bool",
            true,
        ),
        setting(
            "IntervalStyle",
            "postgres",
            "Client Connection Defaults / Locale and Formatting",
            "Sets the display format for interval values.",
            "enum",
            true,
        ),
        setting(
            "standard_conforming_strings",
            "on",
            "Version and Platform Compatibility / Previous PostgreSQL Versions",
            "Causes '...' strings to treat backslashes literally.",
            "bool",
            true,
        ),
        setting(
            "search_path",
            "\"$user\", public",
            "Client Connection Defaults / Statement Behavior",
            "Sets the schema search order for names that are not schema-qualified.",
            "string",
            false,
        ),
        setting(
            "max_identifier_length",
            "63",
            "Preset Options",
            "Shows the maximum identifier length.",
            "integer",
            false,
        ),
        setting(
            "transaction_isolation",
            "read committed",
            "Client Connection Defaults / Statement Behavior",
            "Sets the current transaction's isolation level.",
            "enum",
            false,
        ),
    ]
}

fn builtin_types() -> Vec<PgType> {
    struct Def {
        oid: i64,
        name: &'static str,
        display_name: &'static str,
        len: i64,
        byval: bool,
        category: &'static str,
        preferred: bool,
        array_oid: i64,
        io_prefix: &'static str,
        typmod_prefix: Option<&'static str>,
        align: &'static str,
        storage: &'static str,
    }

    let base = |d: Def| PgType {
        oid: d.oid,
        name: d.name,
        display_name: d.display_name,
        len: d.len,
        byval: d.byval,
        typtype: "b",
        category: d.category,
        preferred: d.preferred,
        array_oid: d.array_oid,
        io_prefix: d.io_prefix,
        typmod_prefix: d.typmod_prefix,
        align: d.align,
        storage: d.storage,
        // Collatable string types use the default collation, name uses "C".
        collation: match d.category {
            "S" if d.name == "name" => 950,
            "S" => 100,
            _ => 0,
        },
    };

    let range = |oid: i64, name: &'static str, array_oid: i64, align: &'static str| PgType {
        oid,
        name,
        display_name: name,
        len: -1,
        byval: false,
        typtype: "r",
        category: "R",
        preferred: false,
        array_oid,
        io_prefix: "range_",
        typmod_prefix: None,
        align,
        storage: "x",
        collation: 0,
    };

    vec![
        base(Def {
            oid: 16,
            name: "bool",
            display_name: "boolean",
            len: 1,
            byval: true,
            category: "B",
            preferred: true,
            array_oid: 1000,
            io_prefix: "bool",
            typmod_prefix: None,
            align: "c",
            storage: "p",
        }),
        base(Def {
            oid: 17,
            name: "bytea",
            display_name: "bytea",
            len: -1,
            byval: false,
            category: "U",
            preferred: false,
            array_oid: 1001,
            io_prefix: "bytea",
            typmod_prefix: None,
            align: "i",
            storage: "x",
        }),
        base(Def {
            oid: 18,
            name: "char",
            display_name: "\"char\"",
            len: 1,
            byval: true,
            category: "Z",
            preferred: false,
            array_oid: 1002,
            io_prefix: "char",
            typmod_prefix: None,
            align: "c",
            storage: "p",
        }),
        base(Def {
            oid: 19,
            name: "name",
            display_name: "name",
            len: 64,
            byval: false,
            category: "S",
            preferred: false,
            array_oid: 1003,
            io_prefix: "name",
            typmod_prefix: None,
            align: "c",
            storage: "p",
        }),
        base(Def {
            oid: 20,
            name: "int8",
            display_name: "bigint",
            len: 8,
            byval: true,
            category: "N",
            preferred: false,
            array_oid: 1016,
            io_prefix: "int8",
            typmod_prefix: None,
            align: "d",
            storage: "p",
        }),
        base(Def {
            oid: 21,
            name: "int2",
            display_name: "smallint",
            len: 2,
            byval: true,
            category: "N",
            preferred: false,
            array_oid: 1005,
            io_prefix: "int2",
            typmod_prefix: None,
            align: "s",
            storage: "p",
        }),
        base(Def {
            oid: 23,
            name: "int4",
            display_name: "integer",
            len: 4,
            byval: true,
            category: "N",
            preferred: false,
            array_oid: 1007,
            io_prefix: "int4",
            typmod_prefix: None,
            align: "i",
            storage: "p",
        }),
        base(Def {
            oid: 25,
            name: "text",
            display_name: "text",
            len: -1,
            byval: false,
            category: "S",
            preferred: true,
            array_oid: 1009,
            io_prefix: "text",
            typmod_prefix: None,
            align: "i",
            storage: "x",
        }),
        base(Def {
            oid: 26,
            name: "oid",
            display_name: "oid",
            len: 4,
            byval: true,
            category: "N",
            preferred: true,
            array_oid: 1028,
            io_prefix: "oid",
            typmod_prefix: None,
            align: "i",
            storage: "p",
        }),
        base(Def {
            oid: 114,
            name: "json",
            display_name: "json",
            len: -1,
            byval: false,
            category: "U",
            preferred: false,
            array_oid: 199,
            io_prefix: "json_",
            typmod_prefix: None,
            align: "i",
            storage: "x",
        }),
        base(Def {
            oid: 700,
            name: "float4",
            display_name: "real",
            len: 4,
            byval: true,
            category: "N",
            preferred: false,
            array_oid: 1021,
            io_prefix: "float4",
            typmod_prefix: None,
            align: "i",
            storage: "p",
        }),
        base(Def {
            oid: 701,
            name: "float8",
            display_name: "double precision",
            len: 8,
            byval: true,
            category: "N",
            preferred: true,
            array_oid: 1022,
            io_prefix: "float8",
            typmod_prefix: None,
            align: "d",
            storage: "p",
        }),
        base(Def {
            oid: TYPE_OID_VARCHAR,
            name: "varchar",
            display_name: "character varying",
            len: -1,
            byval: false,
            category: "S",
            preferred: false,
            array_oid: 1015,
            io_prefix: "varchar",
            typmod_prefix: Some("varchar"),
            align: "i",
            storage: "x",
        }),
        base(Def {
            oid: 1082,
            name: "date",
            display_name: "date",
            len: 4,
            byval: true,
            category: "D",
            preferred: false,
            array_oid: 1182,
            io_prefix: "date_",
            typmod_prefix: None,
            align: "i",
            storage: "p",
        }),
        base(Def {
            oid: 1083,
            name: "time",
            display_name: "time without time zone",
            len: 8,
            byval: true,
            category: "D",
            preferred: false,
            array_oid: 1183,
            io_prefix: "time_",
            typmod_prefix: Some("time"),
            align: "d",
            storage: "p",
        }),
        base(Def {
            oid: 1114,
            name: "timestamp",
            display_name: "timestamp without time zone",
            len: 8,
            byval: true,
            category: "D",
            preferred: false,
            array_oid: 1115,
            io_prefix: "timestamp_",
            typmod_prefix: Some("timestamp"),
            align: "d",
            storage: "p",
        }),
        base(Def {
            oid: 1184,
            name: "timestamptz",
            display_name: "timestamp with time zone",
            len: 8,
            byval: true,
            category: "D",
            preferred: true,
            array_oid: 1185,
            io_prefix: "timestamptz_",
            typmod_prefix: Some("timestamptz"),
            align: "d",
            storage: "p",
        }),
        base(Def {
            oid: 1186,
            name: "interval",
            display_name: "interval",
            len: 16,
            byval: false,
            category: "T",
            preferred: true,
            array_oid: 1187,
            io_prefix: "interval_",
            typmod_prefix: Some("interval"),
            align: "d",
            storage: "p",
        }),
        base(Def {
            oid: TYPE_OID_NUMERIC,
            name: "numeric",
            display_name: "numeric",
            len: -1,
            byval: false,
            category: "N",
            preferred: false,
            array_oid: 1231,
            io_prefix: "numeric_",
            typmod_prefix: Some("numeric"),
            align: "i",
            storage: "m",
        }),
        base(Def {
            oid: 2950,
            name: "uuid",
            display_name: "uuid",
            len: 16,
            byval: false,
            category: "U",
            preferred: false,
            array_oid: 2951,
            io_prefix: "uuid_",
            typmod_prefix: None,
            align: "c",
            storage: "p",
        }),
        range(3904, "int4range", 3905, "i"),
        range(3906, "numrange", 3907, "i"),
        range(3908, "tsrange", 3909, "d"),
        range(3910, "tstzrange", 3911, "d"),
        range(3912, "daterange", 3913, "i"),
        range(3926, "int8range", 3927, "d"),
    ]
}
