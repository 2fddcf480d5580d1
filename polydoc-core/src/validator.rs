//! Stateless value validators.
//!
//! Each validator checks one type, format or range constraint on a single stored value
//! and never mutates it. Properties run their validators in declaration order and stop at
//! the first failure.

use bson::{Bson, oid::ObjectId};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{fmt, sync::Arc};

use crate::error::{DocumentStoreError, DocumentStoreResult, ValidationError};

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^.+@[^.].*\.[a-z]{2,10}$").expect("email pattern compiles")
});

static IPV4_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{1,3}\.){3}[0-9]{1,3}$").expect("ipv4 pattern compiles")
});

static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z]+://([^/:]+\.[a-z]{2,10}|([0-9]{1,3}\.){3}[0-9]{1,3})(:[0-9]+)?(/.*)?$")
        .expect("url pattern compiles")
});

static URL_NO_TLD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z]+://([^/:]+|([0-9]{1,3}\.){3}[0-9]{1,3})(:[0-9]+)?(/.*)?$")
        .expect("url pattern compiles")
});

/// A single constraint on a stored value.
pub trait Validator: Send + Sync + fmt::Debug {
    /// Returns `Ok(())` when `value` satisfies the constraint.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] carrying a human-readable message.
    fn validate(&self, value: &Bson) -> Result<(), ValidationError>;
}

/// Shared handle to a validator, as stored on properties.
pub type ValidatorRef = Arc<dyn Validator>;

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Checks the BSON type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCheck {
    Boolean,
    String,
    /// 32- or 64-bit integer.
    Integer,
    /// Double only; integers are rejected.
    Float,
    DateTime,
    Binary,
    Dictionary,
    List,
}

impl Validator for TypeCheck {
    fn validate(&self, value: &Bson) -> Result<(), ValidationError> {
        let (ok, message) = match self {
            TypeCheck::Boolean => (matches!(value, Bson::Boolean(_)), "The value must be a boolean"),
            TypeCheck::String => (matches!(value, Bson::String(_)), "The value must be a string"),
            TypeCheck::Integer => (
                matches!(value, Bson::Int32(_) | Bson::Int64(_)),
                "The value must be an integer",
            ),
            TypeCheck::Float => (matches!(value, Bson::Double(_)), "The value must be a float number"),
            TypeCheck::DateTime => (matches!(value, Bson::DateTime(_)), "Invalid datetime type"),
            TypeCheck::Binary => (matches!(value, Bson::Binary(_)), "The value must be binary data"),
            TypeCheck::Dictionary => (matches!(value, Bson::Document(_)), "The value must be a mapping"),
            TypeCheck::List => (matches!(value, Bson::Array(_)), "The value must be a list"),
        };

        if ok { Ok(()) } else { Err(ValidationError::new(message)) }
    }
}

/// Bounds the length of a string (in characters), list, mapping or binary blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Length {
    min: Option<usize>,
    max: Option<usize>,
}

impl Length {
    /// Minimum length only.
    pub fn at_least(min: usize) -> Self {
        Self { min: Some(min), max: None }
    }

    /// Maximum length only.
    pub fn at_most(max: usize) -> Self {
        Self { min: None, max: Some(max) }
    }

    /// # Panics
    ///
    /// Panics if `min > max`; that is a declaration mistake, not a data problem.
    pub fn between(min: usize, max: usize) -> Self {
        assert!(min <= max, "Length bounds are inverted: {} > {}", min, max);
        Self { min: Some(min), max: Some(max) }
    }
}

impl Validator for Length {
    fn validate(&self, value: &Bson) -> Result<(), ValidationError> {
        let len = match value {
            Bson::String(s) => s.chars().count(),
            Bson::Array(items) => items.len(),
            Bson::Document(doc) => doc.len(),
            Bson::Binary(binary) => binary.bytes.len(),
            Bson::Null => 0,
            _ => return Err(ValidationError::new("The value has no length")),
        };

        let too_short = self.min.is_some_and(|min| len < min);
        let too_long = self.max.is_some_and(|max| len > max);

        if !too_short && !too_long {
            return Ok(());
        }

        Err(ValidationError::new(match (self.min, self.max) {
            (Some(min), Some(max)) => format!("Value length must be between {} and {}", min, max),
            (Some(_), None) => "Value is too short".to_string(),
            _ => "Value is too long".to_string(),
        }))
    }
}

/// Bounds a numeric value, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberRange {
    min: Option<f64>,
    max: Option<f64>,
}

impl NumberRange {
    /// Range with optional inclusive bounds.
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// Lower bound only.
    pub fn at_least(min: f64) -> Self {
        Self::new(Some(min), None)
    }

    /// Upper bound only.
    pub fn at_most(max: f64) -> Self {
        Self::new(None, Some(max))
    }

    /// Both bounds, inclusive.
    pub fn between(min: f64, max: f64) -> Self {
        Self::new(Some(min), Some(max))
    }

    fn message(&self) -> String {
        match (self.min, self.max) {
            (Some(min), None) => format!("Number must be greater than {}", min),
            (None, Some(max)) => format!("Number must be less than {}", max),
            (Some(min), Some(max)) => format!("Number must be between {} and {}", min, max),
            (None, None) => "The value must be a number".to_string(),
        }
    }
}

impl Validator for NumberRange {
    fn validate(&self, value: &Bson) -> Result<(), ValidationError> {
        let in_range = as_number(value).is_some_and(|n| {
            self.min.is_none_or(|min| n >= min) && self.max.is_none_or(|max| n <= max)
        });

        if in_range { Ok(()) } else { Err(ValidationError::new(self.message())) }
    }
}

/// Requires a string value matching a regular expression at its start.
///
/// The match is anchored at the beginning only; add `$` to the pattern to require a full
/// match.
#[derive(Debug, Clone)]
pub struct Regexp {
    regex: Regex,
    message: String,
}

impl Regexp {
    /// # Errors
    ///
    /// Returns a schema definition error if `pattern` does not compile.
    pub fn new(pattern: &str) -> DocumentStoreResult<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| DocumentStoreError::SchemaDefinition(format!("invalid pattern {}: {}", pattern, e)))?;

        Ok(Self::from_regex(regex))
    }

    /// Wraps an already compiled expression.
    pub fn from_regex(regex: Regex) -> Self {
        Self { regex, message: "Invalid string value".to_string() }
    }

    /// Replaces the failure message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Validator for Regexp {
    fn validate(&self, value: &Bson) -> Result<(), ValidationError> {
        match value {
            Bson::String(s) if self.regex.find(s).is_some_and(|m| m.start() == 0) => Ok(()),
            _ => Err(ValidationError::new(self.message.clone())),
        }
    }
}

/// Requires a plausible email address.
#[derive(Debug, Clone, Copy, Default)]
pub struct Email;

impl Validator for Email {
    fn validate(&self, value: &Bson) -> Result<(), ValidationError> {
        match value {
            Bson::String(s) if EMAIL_REGEX.is_match(s) => Ok(()),
            _ => Err(ValidationError::new("Invalid email address")),
        }
    }
}

/// Dotted-quad IPv4 address with every octet in `0..=255`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpAddress;

impl Validator for IpAddress {
    fn validate(&self, value: &Bson) -> Result<(), ValidationError> {
        let valid = match value {
            Bson::String(s) => {
                IPV4_REGEX.is_match(s) && s.split('.').all(|octet| octet.parse::<u8>().is_ok())
            }
            _ => false,
        };

        if valid { Ok(()) } else { Err(ValidationError::new("Invalid IP address")) }
    }
}

/// Requires an http, https or ftp URL.
#[derive(Debug, Clone, Copy)]
pub struct Url {
    require_tld: bool,
}

impl Url {
    /// URL validator; `require_tld` rejects hosts without a top-level domain.
    pub fn new(require_tld: bool) -> Self {
        Self { require_tld }
    }
}

impl Default for Url {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Validator for Url {
    fn validate(&self, value: &Bson) -> Result<(), ValidationError> {
        let regex = if self.require_tld { &*URL_REGEX } else { &*URL_NO_TLD_REGEX };

        match value {
            Bson::String(s) if regex.is_match(s) => Ok(()),
            _ => Err(ValidationError::new("Invalid URL")),
        }
    }
}

/// Accepts identifiers and their 24-digit hex spelling.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectIdFormat;

impl Validator for ObjectIdFormat {
    fn validate(&self, value: &Bson) -> Result<(), ValidationError> {
        match value {
            Bson::ObjectId(_) => Ok(()),
            Bson::String(s) if ObjectId::parse_str(s).is_ok() => Ok(()),
            _ => Err(ValidationError::new("Invalid Object ID")),
        }
    }
}

/// A two-element numeric `[x, y]` pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoPoint;

impl Validator for GeoPoint {
    fn validate(&self, value: &Bson) -> Result<(), ValidationError> {
        let Bson::Array(items) = value else {
            return Err(ValidationError::new("GeoPt can only hold a list of (x, y)"));
        };

        if items.len() != 2 {
            return Err(ValidationError::new("GeoPt must have exactly two elements (x, y)"));
        }

        if items.iter().all(|item| as_number(item).is_some()) {
            Ok(())
        } else {
            Err(ValidationError::new("GeoPt coordinates must be numbers"))
        }
    }
}

/// Adapts a named predicate into a validator.
///
/// ```ignore
/// let even = Predicate::new("even", |v| v.as_i64().is_some_and(|n| n % 2 == 0), "must be even");
/// ```
#[derive(Clone)]
pub struct Predicate {
    name: &'static str,
    check: Arc<dyn Fn(&Bson) -> bool + Send + Sync>,
    message: String,
}

impl Predicate {
    /// Wraps `check` under `name`, failing with `message`.
    pub fn new(
        name: &'static str,
        check: impl Fn(&Bson) -> bool + Send + Sync + 'static,
        message: impl Into<String>,
    ) -> Self {
        Self { name, check: Arc::new(check), message: message.into() }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("name", &self.name).finish()
    }
}

impl Validator for Predicate {
    fn validate(&self, value: &Bson) -> Result<(), ValidationError> {
        if (self.check)(value) { Ok(()) } else { Err(ValidationError::new(self.message.clone())) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{Binary, doc, spec::BinarySubtype};

    #[test]
    fn type_checks() {
        assert!(TypeCheck::Boolean.validate(&Bson::Boolean(true)).is_ok());
        assert!(TypeCheck::Boolean.validate(&Bson::String("True".into())).is_err());
        assert!(TypeCheck::String.validate(&Bson::Int32(30)).is_err());
        assert!(TypeCheck::Integer.validate(&Bson::Int64(30)).is_ok());
        assert!(TypeCheck::Float.validate(&Bson::Int32(2)).is_err());
        assert!(TypeCheck::Float.validate(&Bson::Double(1.7)).is_ok());
        assert!(TypeCheck::DateTime.validate(&Bson::String("2012-12-25".into())).is_err());
        assert!(TypeCheck::List.validate(&Bson::Array(vec![])).is_ok());
        assert!(TypeCheck::Dictionary.validate(&Bson::Document(doc! {})).is_ok());

        let blob = Bson::Binary(Binary { subtype: BinarySubtype::Generic, bytes: vec![1, 2] });
        assert!(TypeCheck::Binary.validate(&blob).is_ok());
    }

    #[test]
    fn length_messages() {
        let err = Length::at_least(3).validate(&Bson::String("ab".into())).unwrap_err();
        assert_eq!(err.message, "Value is too short");

        let err = Length::at_most(1).validate(&Bson::String("ab".into())).unwrap_err();
        assert_eq!(err.message, "Value is too long");

        let err = Length::between(1, 2).validate(&Bson::Array(vec![1.into(); 3])).unwrap_err();
        assert_eq!(err.message, "Value length must be between 1 and 2");

        assert!(Length::between(2, 2).validate(&Bson::String("éa".into())).is_ok());
        assert!(Length::at_least(1).validate(&Bson::Int32(4)).is_err());
    }

    #[test]
    #[should_panic]
    fn length_rejects_inverted_bounds() {
        Length::between(3, 1);
    }

    #[test]
    fn number_range_bounds_are_inclusive() {
        let range = NumberRange::between(1.0, 80.0);
        assert!(range.validate(&Bson::Int32(30)).is_ok());
        assert!(range.validate(&Bson::Int32(80)).is_ok());
        assert!(range.validate(&Bson::Int32(100)).is_err());
        assert!(range.validate(&Bson::Int64(-1)).is_err());
        assert!(range.validate(&Bson::String("30".into())).is_err());

        let heights = NumberRange::between(1.2, 2.2);
        assert!(heights.validate(&Bson::Double(1.19)).is_err());
        assert!(heights.validate(&Bson::Double(2.21)).is_err());
        assert!(heights.validate(&Bson::Double(1.70)).is_ok());

        let err = NumberRange::at_least(5.0).validate(&Bson::Int32(1)).unwrap_err();
        assert_eq!(err.message, "Number must be greater than 5");
    }

    #[test]
    fn formats() {
        assert!(Email.validate(&Bson::String("spam@spam".into())).is_err());
        assert!(Email.validate(&Bson::String("spam@nospam.com".into())).is_ok());

        assert!(IpAddress.validate(&Bson::String("256.1.1".into())).is_err());
        assert!(IpAddress.validate(&Bson::String("256.1.1.1".into())).is_err());
        assert!(IpAddress.validate(&Bson::String("192.168.0.1".into())).is_ok());

        assert!(Url::default().validate(&Bson::String("http://google".into())).is_err());
        assert!(Url::default().validate(&Bson::String("http://google.com".into())).is_ok());
        assert!(Url::new(false).validate(&Bson::String("http://google".into())).is_ok());
        assert!(Url::default().validate(&Bson::String("http://10.0.0.1:8080/x".into())).is_ok());
    }

    #[test]
    fn regexp_uses_custom_message() {
        let slug = Regexp::new(r"^[a-z-]+$").unwrap().with_message("Invalid slug");
        assert!(slug.validate(&Bson::String("hello-world".into())).is_ok());
        assert_eq!(slug.validate(&Bson::String("Hello".into())).unwrap_err().message, "Invalid slug");
        assert!(Regexp::new("(").is_err());
    }

    #[test]
    fn regexp_matches_from_the_start() {
        let abc = Regexp::new("abc").unwrap();
        assert!(abc.validate(&Bson::String("abc".into())).is_ok());
        assert!(abc.validate(&Bson::String("abcdef".into())).is_ok());
        assert!(abc.validate(&Bson::String("xxabc".into())).is_err());

        let digits = Regexp::new(r"\d+").unwrap();
        assert!(digits.validate(&Bson::String("42 apples".into())).is_ok());
        assert!(digits.validate(&Bson::String("apples 42".into())).is_err());
    }

    #[test]
    fn object_ids() {
        assert!(ObjectIdFormat.validate(&Bson::Int32(47)).is_err());
        assert!(ObjectIdFormat.validate(&Bson::String("abc".into())).is_err());
        assert!(ObjectIdFormat.validate(&Bson::String("4c98c26624a7264cef000011".into())).is_ok());
        assert!(ObjectIdFormat.validate(&Bson::ObjectId(ObjectId::new())).is_ok());
    }

    #[test]
    fn geo_points() {
        assert!(GeoPoint.validate(&Bson::Int32(5)).is_err());
        assert!(GeoPoint.validate(&Bson::Array(vec![Bson::Double(39.9)])).is_err());
        assert!(GeoPoint.validate(&Bson::Array(vec![Bson::Double(39.9074977), Bson::Double(116.3972282)])).is_ok());
    }

    #[test]
    fn predicates() {
        let even = Predicate::new("even", |v| v.as_i64().is_some_and(|n| n % 2 == 0), "must be even");
        assert!(even.validate(&Bson::Int64(4)).is_ok());
        assert_eq!(even.validate(&Bson::Int64(3)).unwrap_err().message, "must be even");
    }
}
