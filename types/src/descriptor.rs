//! Declared-type descriptors used to pick a call adapter.
//!
//! A descriptor is an explicit stand-in for a generic type as written at a call-site,
//! e.g. `CallFuture<Response<out String>>`. It is inspected once per call-site and never
//! consulted again at call time.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Raw type names the adapter layer recognizes.
pub mod names {
    /// The suspension primitive returned to callers.
    pub const CALL_FUTURE: &str = "CallFuture";
    /// The response envelope.
    pub const RESPONSE: &str = "Response";
    /// Top type; the implicit upper bound of a bare or contravariant wildcard.
    pub const ANY: &str = "Any";
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// A type without arguments, e.g. `String`.
    Raw(String),
    /// A generic type with its arguments, e.g. `Response<String>`.
    Parameterized {
        raw: String,
        arguments: Vec<TypeDescriptor>,
    },
    /// A use-site variance projection: `out T` (upper bound), `in T` (lower bound), or `*`.
    Wildcard {
        upper: Box<TypeDescriptor>,
        lower: Option<Box<TypeDescriptor>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("index {index} not in range [0,{len}) for {kind} type")]
pub struct BoundIndexError {
    pub index: usize,
    pub len: usize,
    pub kind: &'static str,
}

impl TypeDescriptor {
    pub fn raw(name: impl Into<String>) -> Self {
        Self::Raw(name.into())
    }

    pub fn parameterized(
        raw: impl Into<String>,
        arguments: impl IntoIterator<Item = TypeDescriptor>,
    ) -> Self {
        Self::Parameterized {
            raw: raw.into(),
            arguments: arguments.into_iter().collect(),
        }
    }

    /// `out T`
    #[must_use]
    pub fn covariant(upper: TypeDescriptor) -> Self {
        Self::Wildcard {
            upper: Box::new(upper),
            lower: None,
        }
    }

    /// `in T`
    #[must_use]
    pub fn contravariant(lower: TypeDescriptor) -> Self {
        Self::Wildcard {
            upper: Box::new(Self::raw(names::ANY)),
            lower: Some(Box::new(lower)),
        }
    }

    /// `*`
    #[must_use]
    pub fn star() -> Self {
        Self::covariant(Self::raw(names::ANY))
    }

    /// Raw (erased) name of this type. A wildcard erases to its upper bound.
    #[must_use]
    pub fn raw_type(&self) -> &str {
        match self {
            Self::Raw(name) | Self::Parameterized { raw: name, .. } => name,
            Self::Wildcard { upper, .. } => upper.raw_type(),
        }
    }

    #[must_use]
    pub fn is_parameterized(&self) -> bool {
        matches!(self, Self::Parameterized { .. })
    }

    /// Type arguments, if this is a parameterized type.
    #[must_use]
    pub fn parameterized_arguments(&self) -> Option<&[TypeDescriptor]> {
        match self {
            Self::Parameterized { arguments, .. } => Some(arguments),
            _ => None,
        }
    }

    /// Upper bound of the argument at `index`: `out Foo` gives `Foo`, an invariant `Foo` gives itself.
    pub fn upper_bound(&self, index: usize) -> Result<&TypeDescriptor, BoundIndexError> {
        let argument = self.argument(index)?;
        Ok(match argument {
            Self::Wildcard { upper, .. } => upper,
            other => other,
        })
    }

    /// Lower bound of the argument at `index`: `in Foo` gives `Foo`, an invariant `Foo` gives itself.
    ///
    /// A wildcard without a lower bound falls back to its upper bound.
    pub fn lower_bound(&self, index: usize) -> Result<&TypeDescriptor, BoundIndexError> {
        let argument = self.argument(index)?;
        Ok(match argument {
            Self::Wildcard {
                lower: Some(lower), ..
            } => lower,
            Self::Wildcard { upper, lower: None } => upper,
            other => other,
        })
    }

    fn argument(&self, index: usize) -> Result<&TypeDescriptor, BoundIndexError> {
        let arguments = self.parameterized_arguments().unwrap_or_default();
        arguments.get(index).ok_or(BoundIndexError {
            index,
            len: arguments.len(),
            kind: if self.is_parameterized() {
                "parameterized"
            } else {
                "raw"
            },
        })
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(name) => f.write_str(name),
            Self::Parameterized { raw, arguments } => {
                write!(f, "{raw}<")?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{argument}")?;
                }
                f.write_str(">")
            }
            Self::Wildcard {
                lower: Some(lower), ..
            } => write!(f, "in {lower}"),
            Self::Wildcard { upper, lower: None } if upper.raw_type() == names::ANY => {
                f.write_str("*")
            }
            Self::Wildcard { upper, lower: None } => write!(f, "out {upper}"),
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeParseError {
    #[error("type descriptor cannot be empty")]
    Empty,
    #[error("expected a type name at offset {0}")]
    ExpectedName(usize),
    #[error("expected '{expected}' at offset {offset}")]
    Expected { expected: char, offset: usize },
    #[error("unexpected trailing input at offset {0}")]
    Trailing(usize),
    #[error("wildcard is only allowed as a type argument (offset {0})")]
    WildcardOutsideArguments(usize),
}

impl FromStr for TypeDescriptor {
    type Err = TypeParseError;

    /// Parse `Name`, `Name<Arg, ...>`, where an argument may be `out T`, `in T`, or `*`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(TypeParseError::Empty);
        }
        let mut parser = Parser { src: s, pos: 0 };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(TypeParseError::Trailing(parser.pos));
        }
        Ok(ty)
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), TypeParseError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(TypeParseError::Expected {
                expected: c,
                offset: self.pos,
            })
        }
    }

    fn name(&mut self) -> Result<&'a str, TypeParseError> {
        let src = self.src;
        self.skip_ws();
        let start = self.pos;
        let len = self
            .rest()
            .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '.' | ':')))
            .unwrap_or(self.rest().len());
        if len == 0 {
            return Err(TypeParseError::ExpectedName(start));
        }
        self.pos += len;
        Ok(&src[start..self.pos])
    }

    fn parse_type(&mut self) -> Result<TypeDescriptor, TypeParseError> {
        self.skip_ws();
        if self.rest().starts_with('*') {
            return Err(TypeParseError::WildcardOutsideArguments(self.pos));
        }
        let raw = self.name()?.to_string();
        if !self.eat('<') {
            return Ok(TypeDescriptor::Raw(raw));
        }
        let mut arguments = vec![self.parse_argument()?];
        while self.eat(',') {
            arguments.push(self.parse_argument()?);
        }
        self.expect('>')?;
        Ok(TypeDescriptor::Parameterized { raw, arguments })
    }

    fn parse_argument(&mut self) -> Result<TypeDescriptor, TypeParseError> {
        if self.eat('*') {
            return Ok(TypeDescriptor::star());
        }
        self.skip_ws();
        let checkpoint = self.pos;
        match self.name()? {
            "out" if self.at_type_start() => Ok(TypeDescriptor::covariant(self.parse_type()?)),
            "in" if self.at_type_start() => Ok(TypeDescriptor::contravariant(self.parse_type()?)),
            _ => {
                self.pos = checkpoint;
                self.parse_type()
            }
        }
    }

    /// True when a type name follows whitespace, i.e. the previous word was a variance keyword.
    fn at_type_start(&self) -> bool {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        trimmed.len() < rest.len() && trimmed.starts_with(|c: char| c.is_alphanumeric() || c == '_')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> TypeDescriptor {
        s.parse().unwrap()
    }

    #[test]
    fn parses_nested_parameterized_types() {
        let ty = parse("CallFuture<Response<String>>");
        assert_eq!(ty.raw_type(), names::CALL_FUTURE);
        let inner = ty.upper_bound(0).unwrap();
        assert_eq!(inner.raw_type(), names::RESPONSE);
        assert_eq!(inner.upper_bound(0).unwrap(), &TypeDescriptor::raw("String"));
    }

    #[test]
    fn parses_variance_projections() {
        let ty = parse("Response<out Foo>");
        assert_eq!(ty.upper_bound(0).unwrap(), &TypeDescriptor::raw("Foo"));

        let ty = parse("Continuation<in Bar>");
        assert_eq!(ty.lower_bound(0).unwrap(), &TypeDescriptor::raw("Bar"));
        assert_eq!(ty.upper_bound(0).unwrap().raw_type(), names::ANY);

        let ty = parse("List<*>");
        assert_eq!(ty.upper_bound(0).unwrap().raw_type(), names::ANY);
    }

    #[test]
    fn type_named_like_a_keyword_is_not_a_projection() {
        let ty = parse("Box<out>");
        assert_eq!(ty.upper_bound(0).unwrap(), &TypeDescriptor::raw("out"));
    }

    #[test]
    fn display_round_trips() {
        for s in [
            "String",
            "CallFuture<Response<out Foo>>",
            "Map<String, in Int>",
            "List<*>",
        ] {
            assert_eq!(parse(s).to_string(), s);
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!("".parse::<TypeDescriptor>(), Err(TypeParseError::Empty));
        assert!(matches!(
            "Response<String".parse::<TypeDescriptor>(),
            Err(TypeParseError::Expected { expected: '>', .. })
        ));
        assert!(matches!(
            "Response<>".parse::<TypeDescriptor>(),
            Err(TypeParseError::ExpectedName(_))
        ));
        assert!(matches!(
            "String extra".parse::<TypeDescriptor>(),
            Err(TypeParseError::Trailing(_))
        ));
        assert!(matches!(
            "*".parse::<TypeDescriptor>(),
            Err(TypeParseError::WildcardOutsideArguments(0))
        ));
    }

    #[test]
    fn bound_index_out_of_range() {
        let err = parse("String").upper_bound(0).unwrap_err();
        assert_eq!(err.len, 0);
        assert_eq!(err.kind, "raw");
        assert!(parse("Response<String>").lower_bound(1).is_err());
    }
}
