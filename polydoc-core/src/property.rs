//! Typed field definitions.
//!
//! A [`Property`] describes one field of a schema: its kind, default value, `required` and
//! `unique` flags, and an ordered list of validators. It also converts values between the
//! in-memory form and the stored form, and for reference and embedded kinds it resolves
//! and saves child documents through the owning document's side cache.
//!
//! Properties are immutable once attached to a schema; attachment only records the field
//! name and the owning schema's name.
//!
//! # Example
//!
//! ```ignore
//! use polydoc::property::Property;
//! use polydoc::validator::{Length, NumberRange};
//!
//! let title = Property::string().required().validator(Length::at_most(120));
//! let age = Property::integer().validator(NumberRange::between(1.0, 80.0));
//! let author = Property::reference("User");
//! ```

use bson::{Bson, oid::ObjectId};
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

use crate::{
    backend::{Database, DbRef},
    document::{CachedChild, Document},
    error::{DocumentStoreError, DocumentStoreResult, ValidationError},
    schema::SchemaRegistry,
    store::DocumentStore,
    validator::{
        Email, GeoPoint, IpAddress, ObjectIdFormat, TypeCheck, Url, Validator, ValidatorRef,
    },
};

/// The semantic type of a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// Untyped; no implicit validator.
    Any,
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    GeoPoint,
    Binary,
    Dictionary,
    List,
    Identifier,
    /// Pointer to a document of the named schema, stored separately.
    Reference(String),
    /// Document of the named embedded schema, inlined into the owner's record.
    Embedded(String),
}

impl PropertyKind {
    /// Whether values of this kind are documents held in the side cache.
    pub fn is_document(&self) -> bool {
        matches!(self, PropertyKind::Reference(_) | PropertyKind::Embedded(_))
    }
}

/// Value produced for a field that has never been set.
#[derive(Clone)]
pub enum DefaultValue {
    Absent,
    Literal(Bson),
    Generator(Arc<dyn Fn() -> Bson + Send + Sync>),
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Absent => f.write_str("Absent"),
            DefaultValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            DefaultValue::Generator(_) => f.write_str("Generator"),
        }
    }
}

/// Definition of one schema field.
#[derive(Debug, Clone)]
pub struct Property {
    kind: PropertyKind,
    default: DefaultValue,
    required: bool,
    unique: bool,
    validators: Vec<ValidatorRef>,
    field_name: Option<String>,
    owner: Option<String>,
}

impl Property {
    fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            default: DefaultValue::Absent,
            required: false,
            unique: false,
            validators: Vec::new(),
            field_name: None,
            owner: None,
        }
    }

    fn typed(kind: PropertyKind, check: TypeCheck) -> Self {
        Self::new(kind).validator(check)
    }

    /// Untyped field with no implicit validator.
    pub fn any() -> Self {
        Self::new(PropertyKind::Any)
    }

    /// String field defaulting to `""`.
    pub fn string() -> Self {
        Self::typed(PropertyKind::String, TypeCheck::String).with_default("")
    }

    /// String field holding an email address.
    pub fn email() -> Self {
        Self::string().validator(Email)
    }

    /// URL field. With `require_tld` unset, hosts such as `http://localhost` pass.
    pub fn url(require_tld: bool) -> Self {
        Self::string().validator(Url::new(require_tld))
    }

    /// String field holding a dotted-quad IPv4 address.
    pub fn ip_address() -> Self {
        Self::string().validator(IpAddress)
    }

    /// 64-bit integer field defaulting to `0`.
    pub fn integer() -> Self {
        Self::typed(PropertyKind::Integer, TypeCheck::Integer).with_default(0_i64)
    }

    /// Float field defaulting to `0.0`.
    pub fn float() -> Self {
        Self::typed(PropertyKind::Float, TypeCheck::Float).with_default(0.0)
    }

    /// Boolean field defaulting to `false`.
    pub fn boolean() -> Self {
        Self::typed(PropertyKind::Boolean, TypeCheck::Boolean).with_default(false)
    }

    /// Datetime field.
    pub fn datetime() -> Self {
        Self::typed(PropertyKind::DateTime, TypeCheck::DateTime)
    }

    /// `[lat, lng]` pair of numbers.
    pub fn geo_point() -> Self {
        Self::new(PropertyKind::GeoPoint).validator(GeoPoint)
    }

    /// Binary blob field.
    pub fn binary() -> Self {
        Self::typed(PropertyKind::Binary, TypeCheck::Binary)
    }

    /// Nested mapping field, stored as is.
    pub fn dictionary() -> Self {
        Self::typed(PropertyKind::Dictionary, TypeCheck::Dictionary)
    }

    /// List field.
    pub fn list() -> Self {
        Self::typed(PropertyKind::List, TypeCheck::List)
    }

    /// Object identifier field. Hex strings are converted to identifiers when stored.
    pub fn identifier() -> Self {
        Self::new(PropertyKind::Identifier).validator(ObjectIdFormat)
    }

    /// Reference to a document of schema `target`, or of any schema inheriting from it.
    pub fn reference(target: impl Into<String>) -> Self {
        Self::new(PropertyKind::Reference(target.into()))
    }

    /// Document of embedded schema `target` inlined into the owner's record.
    pub fn embedded(target: impl Into<String>) -> Self {
        Self::new(PropertyKind::Embedded(target.into()))
    }

    /// Marks the field as required. Empty values do not count as set.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field unique within its collection. Unique fields are also required.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Value read when the field is absent. Never stored.
    pub fn with_default(mut self, value: impl Into<Bson>) -> Self {
        self.default = DefaultValue::Literal(value.into());
        self
    }

    /// Sets a generator invoked each time the default is needed.
    pub fn with_default_fn(mut self, generator: impl Fn() -> Bson + Send + Sync + 'static) -> Self {
        self.default = DefaultValue::Generator(Arc::new(generator));
        self
    }

    /// Appends a validator. Validators run in the order they were added.
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// The kind of value the field holds.
    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    /// Whether the field must hold a non-empty value.
    pub fn is_required(&self) -> bool {
        self.required || self.unique
    }

    /// Whether the field's values must not repeat within the class.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Validators in the order they run.
    pub fn validators(&self) -> &[ValidatorRef] {
        &self.validators
    }

    /// Field name, once attached.
    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    /// Name of the schema the property is attached to.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Schema name targeted by reference and embedded kinds.
    pub fn target(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::Reference(target) | PropertyKind::Embedded(target) => Some(target),
            _ => None,
        }
    }

    pub(crate) fn attach(&mut self, field_name: &str, owner: &str) {
        self.field_name = Some(field_name.to_string());
        self.owner = Some(owner.to_string());
    }

    fn name(&self) -> &str {
        self.field_name.as_deref().unwrap_or_default()
    }

    /// Produces the default value, invoking the generator if there is one.
    ///
    /// Called on every read of an absent field; nothing is cached.
    pub fn default_value(&self) -> Bson {
        match &self.default {
            DefaultValue::Absent => Bson::Null,
            DefaultValue::Literal(value) => value.clone(),
            DefaultValue::Generator(generator) => generator(),
        }
    }

    /// Converts an in-memory value to its stored form.
    pub fn to_storage(&self, value: Bson) -> Bson {
        match (&self.kind, value) {
            (PropertyKind::Identifier, Bson::String(hex)) => match ObjectId::parse_str(&hex) {
                Ok(id) => Bson::ObjectId(id),
                Err(_) => Bson::String(hex),
            },
            (PropertyKind::Integer, Bson::Int32(n)) => Bson::Int64(n as i64),
            (_, value) => value,
        }
    }

    /// Converts a stored value to its in-memory form.
    pub fn from_storage(&self, value: Bson) -> Bson {
        match (&self.kind, value) {
            (PropertyKind::Integer, Bson::Int32(n)) => Bson::Int64(n as i64),
            (_, value) => value,
        }
    }

    /// Runs the validators in order against `value`, stopping at the first failure.
    ///
    /// Empty values (null, `""`, `[]`, `{}`) always pass; whether a field must be set is
    /// the required-field check's concern.
    ///
    /// # Errors
    ///
    /// Returns the first validator's error, tagged with this field's name.
    pub fn validate(&self, value: &Bson) -> Result<(), ValidationError> {
        if is_empty(value) {
            return Ok(());
        }

        self.validators
            .iter()
            .try_for_each(|validator| validator.validate(value).map_err(|e| e.in_field(self.name())))
    }

    /// Checks that `child` may occupy this reference or embedded slot.
    pub(crate) fn check_document_kind(&self, child: &Document) -> Result<(), ValidationError> {
        let schema = child.schema();
        let invalid = || ValidationError::for_field(self.name(), "Invalid Document type");

        match &self.kind {
            PropertyKind::Reference(target) => {
                if schema.is_embedded() || !schema.is_a(target) {
                    return Err(invalid());
                }
                Ok(())
            }
            PropertyKind::Embedded(target) => {
                if !schema.is_embedded() || !schema.is_a(target) {
                    return Err(invalid());
                }
                if child.object_id().is_some() {
                    return Err(ValidationError::for_field(
                        self.name(),
                        "Embedded document must not have an identifier",
                    ));
                }
                Ok(())
            }
            _ => Err(invalid()),
        }
    }

    /// Loads the referenced document into the side cache and returns it.
    ///
    /// A cached document is returned as is. A cached pointer, or a pointer found in the
    /// stored record, is dereferenced through the target schema's collection and the result
    /// replaces it in the cache. An unset field yields `None`.
    pub(crate) async fn resolve_reference<'d, B: Database>(
        &self,
        document: &'d mut Document,
        store: &DocumentStore<B>,
    ) -> DocumentStoreResult<Option<&'d mut Document>> {
        let field = self.name();
        let target = self.target().unwrap_or_default();

        let pointer = match document.cache.get(field) {
            Some(CachedChild::Loaded(_)) => None,
            Some(CachedChild::Pointer(pointer)) => Some(pointer.clone()),
            None => match document.record.get(field) {
                None | Some(Bson::Null) => return Ok(None),
                Some(stored) => Some(DbRef::from_bson(stored).ok_or_else(|| {
                    DocumentStoreError::InvalidDocument(format!(
                        "field {} does not hold a document pointer",
                        field
                    ))
                })?),
            },
        };

        if let Some(pointer) = pointer {
            let manager = store.manager(target)?;
            let Some(raw) = manager.dereference(&pointer).await? else {
                warn!(
                    field,
                    collection = %pointer.collection,
                    id = %pointer.id,
                    "dangling document reference"
                );
                return Err(DocumentStoreError::DocumentNotFound(
                    pointer.id.to_hex(),
                    pointer.collection,
                ));
            };

            let schema = store.registry().resolve_record_schema(manager.schema(), &raw);
            debug!(field, schema = schema.name(), "resolved reference");
            document
                .cache
                .insert(field.to_string(), CachedChild::Loaded(Box::new(Document::from_raw(schema, raw))));
        }

        match document.cache.get_mut(field) {
            Some(CachedChild::Loaded(child)) => Ok(Some(child.as_mut())),
            _ => Ok(None),
        }
    }

    /// Materializes the embedded document from the owner's nested record into the cache.
    pub(crate) fn resolve_embedded<'d>(
        &self,
        document: &'d mut Document,
        registry: &SchemaRegistry,
    ) -> DocumentStoreResult<Option<&'d mut Document>> {
        let field = self.name();

        if !document.cache.contains_key(field) {
            let nested = match document.record.get(field) {
                None | Some(Bson::Null) => return Ok(None),
                Some(Bson::Document(nested)) => nested.clone(),
                Some(_) => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "field {} does not hold an embedded document",
                        field
                    )));
                }
            };

            let nominal = registry.get(self.target().unwrap_or_default())?;
            let schema = registry.resolve_record_schema(&nominal, &nested);
            document
                .cache
                .insert(field.to_string(), CachedChild::Loaded(Box::new(Document::from_raw(schema, nested))));
        }

        match document.cache.get_mut(field) {
            Some(CachedChild::Loaded(child)) => Ok(Some(child.as_mut())),
            _ => Err(DocumentStoreError::InvalidDocument(format!(
                "field {} holds a pointer instead of an embedded document",
                field
            ))),
        }
    }

    /// Persists the cached child and writes its stored form into the owner's record.
    ///
    /// A referenced child is saved only when it has no identifier yet; the owner then
    /// stores a pointer to it. An embedded child always has its own children saved and is
    /// inlined as a nested record. Fields with nothing cached keep their stored value.
    pub(crate) async fn save_child<B: Database>(
        &self,
        document: &mut Document,
        store: &DocumentStore<B>,
    ) -> DocumentStoreResult<()> {
        let field = self.name();

        let stored = match (&self.kind, document.cache.get_mut(field)) {
            (_, None) => None,
            (PropertyKind::Reference(_), Some(CachedChild::Pointer(pointer))) => Some(pointer.to_bson()),
            (PropertyKind::Reference(_), Some(CachedChild::Loaded(child))) => {
                if child.object_id().is_none() {
                    child.persist(store).await?;
                }

                let pointer = DbRef::new(
                    child.schema().collection()?,
                    child.id()?,
                    Some(store.backend().database_name().to_string()),
                );
                Some(pointer.to_bson())
            }
            (PropertyKind::Embedded(_), Some(CachedChild::Loaded(child))) => {
                child.persist(store).await?;
                Some(Bson::Document(child.record().clone()))
            }
            _ => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "field {} cannot hold a child document",
                    field
                )));
            }
        };

        if let Some(stored) = stored {
            document.record.insert(field.to_string(), stored);
        }

        Ok(())
    }
}

/// Whether a value counts as unset for validation purposes.
pub(crate) fn is_empty(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => true,
        Bson::String(s) => s.is_empty(),
        Bson::Array(items) => items.is_empty(),
        Bson::Document(doc) => doc.is_empty(),
        _ => false,
    }
}
