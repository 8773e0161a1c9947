use super::key::{Key, Op};
use super::merge::is_operator_document;
use crate::errors::Result;
use bson::{Bson, Document as BsonDocument};

/// One fragment to merge into a selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A field condition with an operator from the closed set.
    Field { key: Key, value: Bson },
    /// A field operator outside the closed set (`$not`, `$mod`, `$options`, ...),
    /// forwarded to the backend as written.
    Extra { field: String, operator: String, value: Bson },
    /// A top-level operator (`$and`, `$or`, `$nor`, `$text`, ...).
    Logical { operator: String, value: Bson },
}

/// An ordered list of conditions, the argument of `where_`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    entries: Vec<Condition>,
}

impl Conditions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<Key>, value: impl Into<Bson>) -> Self {
        self.entries.push(Condition::Field { key: key.into(), value: value.into() });
        self
    }

    #[must_use]
    pub fn logical(mut self, operator: &str, value: impl Into<Bson>) -> Self {
        self.entries.push(Condition::Logical { operator: operator.to_string(), value: value.into() });
        self
    }

    pub fn push(&mut self, condition: Condition) {
        self.entries.push(condition);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.entries.iter()
    }

    /// Parses JSON text such as `{"age": {"$gte": 21}, "name": "x"}`.
    ///
    /// # Errors
    /// Returns an error when the text is not a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc = crate::utils::json::parse_json_to_bson_document(json)?;
        Ok(Self::from(doc))
    }
}

impl IntoIterator for Conditions {
    type Item = Condition;
    type IntoIter = std::vec::IntoIter<Condition>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<Key>, V: Into<Bson>> FromIterator<(K, V)> for Conditions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |c, (k, v)| c.with(k, v))
    }
}

impl<K: Into<Key>, V: Into<Bson>> From<(K, V)> for Conditions {
    fn from((k, v): (K, V)) -> Self {
        Self::new().with(k, v)
    }
}

impl<K: Into<Key>, V: Into<Bson>, const N: usize> From<[(K, V); N]> for Conditions {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K: Into<Key>, V: Into<Bson>> From<Vec<(K, V)>> for Conditions {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

/// Splits a raw condition document: operator documents become one condition
/// per operator, `$`-prefixed keys become logical conditions.
impl From<BsonDocument> for Conditions {
    fn from(doc: BsonDocument) -> Self {
        let mut out = Self::new();
        for (k, v) in doc {
            if k.starts_with('$') {
                out.push(Condition::Logical { operator: k, value: v });
                continue;
            }
            match v {
                Bson::Document(ops) if is_operator_document(&ops) => {
                    for (op, operand) in ops {
                        match Op::from_operator(&op) {
                            Some(o) => out.push(Condition::Field { key: Key::new(k.clone(), o), value: operand }),
                            None => out.push(Condition::Extra {
                                field: k.clone(),
                                operator: op,
                                value: operand,
                            }),
                        }
                    }
                }
                other => out.push(Condition::Field { key: Key::new(k, Op::Eq), value: other }),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::field;
    use bson::doc;

    #[test]
    fn raw_documents_split_per_operator() {
        let c = Conditions::from(doc! { "age": { "$gte": 5, "$lt": 10 }, "name": "x", "$or": [{ "a": 1 }] });
        let got: Vec<Condition> = c.into_iter().collect();
        assert_eq!(got.len(), 4);
        assert_eq!(got[0], Condition::Field { key: field("age").gte(), value: Bson::Int32(5) });
        assert_eq!(got[1], Condition::Field { key: field("age").lt(), value: Bson::Int32(10) });
        assert_eq!(got[2], Condition::Field { key: Key::from("name"), value: Bson::String("x".into()) });
        assert!(matches!(&got[3], Condition::Logical { operator, .. } if operator == "$or"));
    }

    #[test]
    fn embedded_documents_stay_literal() {
        let c = Conditions::from(doc! { "address": { "city": "Leeds" } });
        let got: Vec<Condition> = c.into_iter().collect();
        assert!(matches!(&got[0], Condition::Field { key, .. } if key.op == Op::Eq));
    }

    #[test]
    fn unknown_field_operators_are_forwarded() {
        let c = Conditions::from(doc! { "n": { "$mod": [2, 0] } });
        let got: Vec<Condition> = c.into_iter().collect();
        assert!(matches!(&got[0], Condition::Extra { operator, .. } if operator == "$mod"));
    }

    #[test]
    fn json_conditions_parse() {
        let c = Conditions::from_json(r#"{"country": "England", "num_tours": {"$gt": 1}}"#).unwrap();
        assert_eq!(c.len(), 2);
    }
}
