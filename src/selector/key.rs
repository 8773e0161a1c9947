use bson::{Bson, doc};

/// The closed set of operators the builder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Ne,
    In,
    Nin,
    All,
    Exists,
    Size,
    ElemMatch,
    Regex,
}

impl Op {
    /// Backend operator key; `None` for plain equality.
    #[must_use]
    pub const fn operator(self) -> Option<&'static str> {
        match self {
            Self::Eq => None,
            Self::Gt => Some("$gt"),
            Self::Gte => Some("$gte"),
            Self::Lt => Some("$lt"),
            Self::Lte => Some("$lte"),
            Self::Ne => Some("$ne"),
            Self::In => Some("$in"),
            Self::Nin => Some("$nin"),
            Self::All => Some("$all"),
            Self::Exists => Some("$exists"),
            Self::Size => Some("$size"),
            Self::ElemMatch => Some("$elemMatch"),
            Self::Regex => Some("$regex"),
        }
    }

    #[must_use]
    pub fn from_operator(s: &str) -> Option<Self> {
        Some(match s {
            "$eq" => Self::Eq,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$ne" => Self::Ne,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$all" => Self::All,
            "$exists" => Self::Exists,
            "$size" => Self::Size,
            "$elemMatch" => Self::ElemMatch,
            "$regex" => Self::Regex,
            _ => return None,
        })
    }

    /// Operators whose operand is a list of values.
    #[must_use]
    pub const fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::Nin | Self::All)
    }
}

/// A field path paired with an operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub field: String,
    pub op: Op,
}

impl Key {
    pub fn new(field: impl Into<String>, op: Op) -> Self {
        let field = field.into();
        // `id` is the public alias of the primary key
        let field = if field == "id" { "_id".to_string() } else { field };
        Self { field, op }
    }
}

impl From<&str> for Key {
    fn from(field: &str) -> Self {
        Self::new(field, Op::Eq)
    }
}

impl From<String> for Key {
    fn from(field: String) -> Self {
        Self::new(field, Op::Eq)
    }
}

/// Starting point for operator keys: `field("age").gte()`.
#[derive(Debug, Clone)]
pub struct Field(String);

#[must_use]
pub fn field(name: impl Into<String>) -> Field {
    Field(name.into())
}

impl Field {
    fn key(self, op: Op) -> Key {
        Key::new(self.0, op)
    }
    #[must_use]
    pub fn eq(self) -> Key {
        self.key(Op::Eq)
    }
    #[must_use]
    pub fn gt(self) -> Key {
        self.key(Op::Gt)
    }
    #[must_use]
    pub fn gte(self) -> Key {
        self.key(Op::Gte)
    }
    #[must_use]
    pub fn lt(self) -> Key {
        self.key(Op::Lt)
    }
    #[must_use]
    pub fn lte(self) -> Key {
        self.key(Op::Lte)
    }
    #[must_use]
    pub fn ne(self) -> Key {
        self.key(Op::Ne)
    }
    #[must_use]
    pub fn in_(self) -> Key {
        self.key(Op::In)
    }
    #[must_use]
    pub fn nin(self) -> Key {
        self.key(Op::Nin)
    }
    #[must_use]
    pub fn all(self) -> Key {
        self.key(Op::All)
    }
    #[must_use]
    pub fn exists(self) -> Key {
        self.key(Op::Exists)
    }
    #[must_use]
    pub fn size(self) -> Key {
        self.key(Op::Size)
    }
    #[must_use]
    pub fn elem_match(self) -> Key {
        self.key(Op::ElemMatch)
    }
    #[must_use]
    pub fn regex(self) -> Key {
        self.key(Op::Regex)
    }
}

/// Regex operand. A native pattern and a raw backend pattern produce the same
/// condition shape: `{"$regex": pattern, "$options": options}`.
#[derive(Debug, Clone)]
pub enum Pattern {
    Native(regex::Regex),
    Raw { pattern: String, options: String },
}

impl Pattern {
    pub fn raw(pattern: impl Into<String>, options: impl Into<String>) -> Self {
        Self::Raw { pattern: pattern.into(), options: options.into() }
    }

    /// Splits a native pattern's leading inline flags (`(?i)`) into options.
    #[must_use]
    pub fn parts(&self) -> (String, String) {
        match self {
            Self::Native(re) => {
                let s = re.as_str();
                if let Some(rest) = s.strip_prefix("(?")
                    && let Some(end) = rest.find(')')
                {
                    let flags = &rest[..end];
                    if !flags.is_empty() && flags.chars().all(|c| matches!(c, 'i' | 'm' | 's' | 'x')) {
                        return (rest[end + 1..].to_string(), flags.to_string());
                    }
                }
                (s.to_string(), String::new())
            }
            Self::Raw { pattern, options } => (pattern.clone(), options.clone()),
        }
    }
}

impl From<regex::Regex> for Pattern {
    fn from(re: regex::Regex) -> Self {
        Self::Native(re)
    }
}

impl From<Pattern> for Bson {
    fn from(p: Pattern) -> Self {
        let (pattern, options) = p.parts();
        if options.is_empty() {
            Self::Document(doc! { "$regex": pattern })
        } else {
            Self::Document(doc! { "$regex": pattern, "$options": options })
        }
    }
}
