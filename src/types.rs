use bson::{Bson, Document as BsonDocument};
use serde::{Deserialize, Serialize};

// Safety limits to prevent resource abuse
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_SORT_FIELDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    #[must_use]
    pub const fn direction(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, order: Order) -> Self {
        Self { field: field.into(), order }
    }
}

/// Sort specification as the backend expects it.
#[must_use]
pub fn sort_document(sort: &[SortSpec]) -> BsonDocument {
    let mut d = BsonDocument::new();
    for s in sort {
        d.insert(s.field.clone(), Bson::Int32(s.order.direction()));
    }
    d
}

/// Field projection. Inclusion and exclusion never mix in one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Only(Vec<String>),
    Without(Vec<String>),
}

impl Projection {
    /// Whether a document loaded under this projection carries `field`.
    #[must_use]
    pub fn allows(&self, field: &str) -> bool {
        let related = |f: &String| {
            f == field
                || field.strip_prefix(f.as_str()).is_some_and(|rest| rest.starts_with('.'))
        };
        match self {
            Self::Only(fields) => {
                field == "_id"
                    || fields.iter().any(related)
                    || fields.iter().any(|f| {
                        f.strip_prefix(field).is_some_and(|rest| rest.starts_with('.'))
                    })
            }
            Self::Without(fields) => !fields.iter().any(related),
        }
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        match self {
            Self::Only(f) | Self::Without(f) => f,
        }
    }

    #[must_use]
    pub fn to_document(&self) -> BsonDocument {
        let mut d = BsonDocument::new();
        match self {
            Self::Only(fields) => {
                d.insert("_id", Bson::Int32(1));
                for f in fields {
                    d.insert(f.clone(), Bson::Int32(1));
                }
            }
            Self::Without(fields) => {
                for f in fields {
                    d.insert(f.clone(), Bson::Int32(0));
                }
            }
        }
        d
    }
}

/// Whether `first`/`last` add an `_id` tie-breaker to the sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdSort {
    #[default]
    Auto,
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub batch_size: Option<u32>,
    pub id_sort: Option<IdSort>,
}

impl QueryOptions {
    /// Values set on `overlay` win.
    #[must_use]
    pub fn merged(&self, overlay: &Self) -> Self {
        Self {
            limit: overlay.limit.or(self.limit),
            skip: overlay.skip.or(self.skip),
            batch_size: overlay.batch_size.or(self.batch_size),
            id_sort: overlay.id_sort.or(self.id_sort),
        }
    }
}

/// How the next array-operator condition combines with one already present on
/// the same field. Without an explicit strategy the new operand replaces the old.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Override,
    Union,
    Intersect,
}

/// Stable string form of a value, used to group documents by key.
#[must_use]
pub fn value_key(v: &Bson) -> String {
    match v {
        Bson::ObjectId(o) => format!("oid:{}", o.to_hex()),
        Bson::String(s) => format!("s:{s}"),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
            format!("n:{}", crate::utils::num::bson_as_f64(v).unwrap_or(f64::NAN))
        }
        other => format!("{other:?}"),
    }
}

/// Human readable id for error messages.
#[must_use]
pub fn id_to_string(v: &Bson) -> String {
    match v {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(o) => o.to_hex(),
        other => other.to_string(),
    }
}
