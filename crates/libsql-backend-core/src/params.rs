//! Statement parameters.

use crate::value::Value;
use std::fmt;

/// Parameters bound to one statement execution.
///
/// The shape decides the placeholder dialect: positional parameters pair
/// with `%s` (adapter side) or `?` (native side), named parameters with
/// `%(name)s` or `:name`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    /// No parameters; the statement text is used verbatim.
    #[default]
    None,
    Positional(Vec<Value>),
    /// Name/value pairs in caller order. Names carry no sigil.
    Named(Vec<(String, Value)>),
}

impl Params {
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Params::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Params::None)
    }

    pub fn len(&self) -> usize {
        match self {
            Params::None => 0,
            Params::Positional(values) => values.len(),
            Params::Named(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a named parameter.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        match self {
            Params::Named(pairs) => pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.get_named(name).is_some()
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(pairs: Vec<(String, Value)>) -> Self {
        Params::Named(pairs)
    }
}

impl<T: Into<Params>> From<Option<T>> for Params {
    fn from(params: Option<T>) -> Self {
        params.map_or(Params::None, Into::into)
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Params::None => write!(f, "()"),
            Params::Positional(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Params::Named(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_convert_values() {
        let p = Params::positional([1i64, 2]);
        assert_eq!(p, Params::Positional(vec![Value::BigInt(1), Value::BigInt(2)]));

        let n = Params::named([("name", "r1")]);
        assert_eq!(n.get_named("name"), Some(&Value::Text("r1".into())));
        assert!(!n.contains_name("other"));
    }

    #[test]
    fn len_and_emptiness() {
        assert!(Params::None.is_empty());
        assert!(Params::Positional(vec![]).is_empty());
        assert_eq!(Params::positional(["a", "b"]).len(), 2);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Params::positional([Value::Int(1), "r1".into()]).to_string(), "[1, 'r1']");
        assert_eq!(Params::named([("name", "r1")]).to_string(), "{name: 'r1'}");
        assert_eq!(Params::None.to_string(), "()");
    }

    #[test]
    fn option_conversion() {
        let none: Params = Option::<Vec<Value>>::None.into();
        assert!(none.is_none());
        let some: Params = Some(vec![Value::Int(1)]).into();
        assert_eq!(some.len(), 1);
    }
}
