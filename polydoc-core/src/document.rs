//! Schema-bound document instances.
//!
//! A [`Document`] holds a raw record (the stored form of every scalar field) plus a side
//! cache of child documents for reference and embedded fields. Field reads and writes go
//! through the schema's [`Property`] definitions; child documents are only turned into
//! pointers or nested records when the owner is saved.
//!
//! ```ignore
//! let mut blog = store.create_with("Blog", [("title", Bson::from("Slash rocks"))])?;
//! blog.set("tags", vec!["gibson", "classic"])?;
//! blog.save(&store).await?;
//!
//! let id = blog.id()?;
//! ```
//!
//! Child documents are owned by value. A reference to an already stored document can be
//! held as a [`DbRef`] pointer instead, which is dereferenced on first access.

use bson::{
    Bson, Document as RawDocument, de::deserialize_from_bson, oid::ObjectId, ser::serialize_to_bson,
};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

use crate::{
    backend::{Database, DbRef},
    error::{DocumentStoreError, DocumentStoreResult, ValidationError},
    property::{Property, PropertyKind, is_empty},
    query::Filter,
    schema::{CLASS_NAME_FIELD, CLASSES_FIELD, ID_FIELD, Schema, is_reserved},
    store::DocumentStore,
};

/// Side cache entry for a reference or embedded field.
#[derive(Debug, Clone)]
pub(crate) enum CachedChild {
    Loaded(Box<Document>),
    /// Stored pointer not dereferenced yet.
    Pointer(DbRef),
}

/// One schema-typed record.
#[derive(Debug, Clone)]
pub struct Document {
    schema: Arc<Schema>,
    pub(crate) record: RawDocument,
    pub(crate) cache: HashMap<String, CachedChild>,
    extras: IndexMap<String, Property>,
}

impl Document {
    /// Creates an empty, unsaved document.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::from_raw(schema, RawDocument::new())
    }

    /// Creates an unsaved document with initial field values.
    ///
    /// Reference fields accept [`DbRef`] values, which go to the side cache rather than the
    /// record.
    ///
    /// # Errors
    ///
    /// Fails like [`Document::set`] on unknown fields or malformed child values.
    pub fn with_fields<K, V>(
        schema: Arc<Schema>,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> DocumentStoreResult<Self>
    where
        K: AsRef<str>,
        V: Into<Bson>,
    {
        let mut document = Self::new(schema);
        document.update(fields)?;
        Ok(document)
    }

    /// Wraps a record read from storage.
    pub fn from_raw(schema: Arc<Schema>, record: RawDocument) -> Self {
        Self {
            schema,
            record,
            cache: HashMap::new(),
            extras: IndexMap::new(),
        }
    }

    /// The schema this document was created or materialized as.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Name of the document's schema.
    pub fn class_name(&self) -> &str {
        self.schema.name()
    }

    /// The stored form of every field set so far.
    pub fn record(&self) -> &RawDocument {
        &self.record
    }

    /// Looks a field up on the schema, then among the fields installed on this instance.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.schema.property(name).or_else(|| self.extras.get(name))
    }

    /// Names of the fields installed on this instance only.
    pub fn expanded_fields(&self) -> impl Iterator<Item = &str> {
        self.extras.keys().map(String::as_str)
    }

    /// Whether the field has a stored value or a cached child.
    pub fn contains(&self, name: &str) -> bool {
        self.record.contains_key(name) || self.cache.contains_key(name)
    }

    /// The identifier, if the document has one.
    pub fn object_id(&self) -> Option<ObjectId> {
        self.record.get_object_id(ID_FIELD).ok()
    }

    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotSaved`] if no identifier was ever assigned.
    pub fn id(&self) -> DocumentStoreResult<ObjectId> {
        self.object_id()
            .ok_or_else(|| DocumentStoreError::NotSaved(self.schema.name().to_string()))
    }

    /// Reads a scalar field in its in-memory form.
    ///
    /// Absent fields yield the property's default. `_id` reads as `Null` until the document
    /// is saved. Undeclared names read the raw stored value when there is one.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnknownField`] for names that are neither declared nor
    /// stored, and [`DocumentStoreError::InvalidDocument`] for reference and embedded fields,
    /// which are read with [`Document::reference`] and [`Document::embedded`].
    pub fn get(&self, name: &str) -> DocumentStoreResult<Bson> {
        if name == ID_FIELD {
            return Ok(self.record.get(ID_FIELD).cloned().unwrap_or(Bson::Null));
        }

        let Some(property) = self.property(name) else {
            return self
                .record
                .get(name)
                .cloned()
                .ok_or_else(|| self.unknown_field(name));
        };

        if property.kind().is_document() {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "field {} holds a document; use reference() or embedded()",
                name
            )));
        }

        Ok(match self.record.get(name) {
            Some(value) => property.from_storage(value.clone()),
            None => property.from_storage(property.default_value()),
        })
    }

    /// Writes a field through its property.
    ///
    /// Writing `_id` installs an identifier field on the instance, converting hex strings to
    /// identifiers. Reference fields take a [`DbRef`] pointer; embedded fields take the
    /// nested record. `Null` clears either.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnknownField`] for undeclared names and
    /// [`DocumentStoreError::InvalidDocument`] for values a document field cannot hold.
    pub fn set(&mut self, name: &str, value: impl Into<Bson>) -> DocumentStoreResult<()> {
        let value = value.into();

        if name == ID_FIELD && self.property(ID_FIELD).is_none() {
            let mut identifier = Property::identifier();
            identifier.attach(ID_FIELD, self.schema.name());
            self.extras.insert(ID_FIELD.to_string(), identifier);
        }

        let property = self.property(name).ok_or_else(|| self.unknown_field(name))?.clone();

        match (property.kind(), value) {
            (PropertyKind::Reference(_) | PropertyKind::Embedded(_), Bson::Null) => {
                self.cache.remove(name);
                self.record.remove(name);
            }
            (PropertyKind::Reference(_), value) => {
                let pointer = DbRef::from_bson(&value).ok_or_else(|| {
                    DocumentStoreError::InvalidDocument(format!(
                        "reference field {} takes a document pointer",
                        name
                    ))
                })?;
                self.cache.insert(name.to_string(), CachedChild::Pointer(pointer));
            }
            (PropertyKind::Embedded(_), nested @ Bson::Document(_)) => {
                self.cache.remove(name);
                self.record.insert(name, nested);
            }
            (PropertyKind::Embedded(_), _) => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "embedded field {} takes a nested document",
                    name
                )));
            }
            (_, value) => {
                let stored = property.to_storage(value);
                self.record.insert(name, stored);
            }
        }

        Ok(())
    }

    /// Sets several fields, in order.
    pub fn update<K, V>(&mut self, fields: impl IntoIterator<Item = (K, V)>) -> DocumentStoreResult<()>
    where
        K: AsRef<str>,
        V: Into<Bson>,
    {
        fields
            .into_iter()
            .try_for_each(|(name, value)| self.set(name.as_ref(), value))
    }

    /// Places a child document in a reference field. It is saved with the owner.
    pub fn set_reference(&mut self, name: &str, child: Document) -> DocumentStoreResult<()> {
        document_property(&self.schema, name, true)?;
        self.cache.insert(name.to_string(), CachedChild::Loaded(Box::new(child)));
        Ok(())
    }

    /// Places a child document in an embedded field. It is inlined when the owner is saved.
    pub fn set_embedded(&mut self, name: &str, child: Document) -> DocumentStoreResult<()> {
        document_property(&self.schema, name, false)?;
        self.cache.insert(name.to_string(), CachedChild::Loaded(Box::new(child)));
        Ok(())
    }

    /// Resolves a reference field, dereferencing its pointer on first access.
    ///
    /// Returns `None` when the field is unset. Later calls return the cached document.
    pub async fn reference<B: Database>(
        &mut self,
        store: &DocumentStore<B>,
        name: &str,
    ) -> DocumentStoreResult<Option<&mut Document>> {
        let schema = self.schema.clone();
        let property = document_property(&schema, name, true)?;
        property.resolve_reference(self, store).await
    }

    /// Resolves an embedded field from the nested record. Returns `None` when unset.
    pub fn embedded<B: Database>(
        &mut self,
        store: &DocumentStore<B>,
        name: &str,
    ) -> DocumentStoreResult<Option<&mut Document>> {
        let schema = self.schema.clone();
        let property = document_property(&schema, name, false)?;
        property.resolve_embedded(self, store.registry())
    }

    /// Installs an ad hoc field on this instance and sets its value.
    ///
    /// Only expandable schemas allow this. The schema itself is never changed, so other
    /// instances do not see the field.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if the schema is not expandable, the
    /// name is declared or reserved, or the property is a reference or embedded kind.
    pub fn expand(
        &mut self,
        name: &str,
        mut property: Property,
        value: impl Into<Bson>,
    ) -> DocumentStoreResult<()> {
        if !self.schema.is_expandable() {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "schema {} is not expandable",
                self.schema.name()
            )));
        }

        if self.schema.property(name).is_some() || is_reserved(name) {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "field {} cannot be installed on {}",
                name,
                self.schema.name()
            )));
        }

        if property.kind().is_document() {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "expanded field {} must hold a plain value",
                name
            )));
        }

        property.attach(name, self.schema.name());
        self.extras.insert(name.to_string(), property);
        self.set(name, value)
    }

    /// Deletes a field's value. Declared and installed fields may be removed repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnknownField`] for names that are neither declared,
    /// installed nor stored.
    pub fn remove_field(&mut self, name: &str) -> DocumentStoreResult<()> {
        if self.property(name).is_none() && !self.contains(name) {
            return Err(self.unknown_field(name));
        }

        self.record.remove(name);
        self.cache.remove(name);
        Ok(())
    }

    /// Reads a string field.
    pub fn get_str(&self, name: &str) -> DocumentStoreResult<String> {
        match self.get(name)? {
            Bson::String(value) => Ok(value),
            other => Err(mismatch(name, "a string", &other)),
        }
    }

    /// Reads an integer field, widening 32-bit values.
    pub fn get_i64(&self, name: &str) -> DocumentStoreResult<i64> {
        match self.get(name)? {
            Bson::Int64(value) => Ok(value),
            Bson::Int32(value) => Ok(value as i64),
            other => Err(mismatch(name, "an integer", &other)),
        }
    }

    /// Reads a numeric field as `f64`.
    pub fn get_f64(&self, name: &str) -> DocumentStoreResult<f64> {
        match self.get(name)? {
            Bson::Double(value) => Ok(value),
            Bson::Int64(value) => Ok(value as f64),
            Bson::Int32(value) => Ok(value as f64),
            other => Err(mismatch(name, "a number", &other)),
        }
    }

    /// Reads a boolean field.
    pub fn get_bool(&self, name: &str) -> DocumentStoreResult<bool> {
        match self.get(name)? {
            Bson::Boolean(value) => Ok(value),
            other => Err(mismatch(name, "a boolean", &other)),
        }
    }

    /// Reads a datetime field as a `chrono` timestamp.
    pub fn get_datetime(&self, name: &str) -> DocumentStoreResult<DateTime<Utc>> {
        match self.get(name)? {
            Bson::DateTime(value) => Ok(value.to_chrono()),
            other => Err(mismatch(name, "a datetime", &other)),
        }
    }

    /// Reads an identifier field.
    pub fn get_object_id(&self, name: &str) -> DocumentStoreResult<ObjectId> {
        match self.get(name)? {
            Bson::ObjectId(value) => Ok(value),
            other => Err(mismatch(name, "an object id", &other)),
        }
    }

    /// Reads a mapping field.
    pub fn get_document(&self, name: &str) -> DocumentStoreResult<RawDocument> {
        match self.get(name)? {
            Bson::Document(value) => Ok(value),
            other => Err(mismatch(name, "a mapping", &other)),
        }
    }

    /// Reads a list field.
    pub fn get_array(&self, name: &str) -> DocumentStoreResult<Vec<Bson>> {
        match self.get(name)? {
            Bson::Array(value) => Ok(value),
            other => Err(mismatch(name, "a list", &other)),
        }
    }

    /// The record with defaults filled in for absent scalar fields.
    fn snapshot(&self) -> RawDocument {
        let mut snapshot = self.record.clone();
        let properties = self.schema.properties().iter().chain(self.extras.iter());

        for (name, property) in properties {
            if snapshot.contains_key(name) || property.kind().is_document() {
                continue;
            }
            let default = property.default_value();
            if default != Bson::Null {
                snapshot.insert(name.clone(), default);
            }
        }

        snapshot
    }

    /// Relaxed extended JSON of the record, defaults included.
    pub fn to_json(&self) -> Value {
        Bson::Document(self.snapshot()).into_relaxed_extjson()
    }

    /// Deserializes the record, defaults included, into `T`.
    pub fn to_struct<T: DeserializeOwned>(&self) -> DocumentStoreResult<T> {
        Ok(deserialize_from_bson(Bson::Document(self.snapshot()))?)
    }

    /// Sets every field of a serialized struct. A null `_id` is skipped.
    pub fn set_from<T: Serialize>(&mut self, value: &T) -> DocumentStoreResult<()> {
        let Bson::Document(fields) = serialize_to_bson(value)? else {
            return Err(DocumentStoreError::InvalidDocument(
                "value does not serialize to a document".to_string(),
            ));
        };

        fields
            .into_iter()
            .filter(|(name, value)| !(name == ID_FIELD && *value == Bson::Null))
            .try_for_each(|(name, value)| self.set(&name, value))
    }

    /// Checks field values, child document kinds and required fields. Touches no storage.
    ///
    /// Absent fields are checked through their default, the value [`Document::get`] reports.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate_fields(&self) -> Result<(), ValidationError> {
        let properties = self.schema.properties().iter().chain(self.extras.iter());

        for (name, property) in properties {
            if property.kind().is_document() {
                if let Some(CachedChild::Loaded(child)) = self.cache.get(name) {
                    property.check_document_kind(child)?;
                }
                continue;
            }

            match self.record.get(name) {
                Some(value) => property.validate(value)?,
                None => property.validate(&property.from_storage(property.default_value()))?,
            }
        }

        for name in self.schema.required_fields() {
            let present = match self.cache.get(name) {
                Some(_) => true,
                None => self.record.get(name).is_some_and(|value| !is_empty(value)),
            };

            if !present {
                return Err(ValidationError::for_field(name, format!("{} is required", name)));
            }
        }

        Ok(())
    }

    /// Runs [`Document::validate_fields`], then checks unique fields against the collection.
    ///
    /// Children that will be written by [`Document::save`] are validated too: unsaved
    /// referenced documents and every embedded document. Embedded documents skip the
    /// uniqueness check.
    ///
    /// The uniqueness check is a lookup followed later by a separate write, so a
    /// concurrent writer can still slip a duplicate in between.
    pub fn validate<'a, B: Database>(
        &'a self,
        store: &'a DocumentStore<B>,
    ) -> BoxFuture<'a, DocumentStoreResult<()>> {
        async move {
            self.validate_fields()?;

            if !self.schema.is_embedded() {
                self.validate_unique(store).await?;
            }

            for child in self.cache.values() {
                if let CachedChild::Loaded(child) = child {
                    if child.schema.is_embedded() || child.object_id().is_none() {
                        child.validate(store).await?;
                    }
                }
            }

            Ok(())
        }
        .boxed()
    }

    async fn validate_unique<B: Database>(&self, store: &DocumentStore<B>) -> DocumentStoreResult<()> {
        if self.schema.unique_fields().is_empty() {
            return Ok(());
        }

        let manager = store.manager_for(&self.schema)?;

        for name in self.schema.unique_fields() {
            let Some(value) = self.record.get(name).filter(|value| !is_empty(value)) else {
                continue;
            };

            let mut filter = Filter::eq(name.as_str(), value.clone());
            if let Some(id) = self.object_id() {
                filter = filter.and(Filter::ne(ID_FIELD, id));
            }

            if manager.exists(filter).await? {
                let shown = match value {
                    Bson::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Err(ValidationError::for_field(
                    name,
                    format!("Value {} for {} exists already", shown, name),
                )
                .into());
            }
        }

        Ok(())
    }

    /// Validates the document tree, then persists it.
    ///
    /// Children are written before the fields pointing at them. Nothing is written if any
    /// document in the tree fails validation. Embedded documents only save their own
    /// children and are never stored on their own.
    pub async fn save<B: Database>(&mut self, store: &DocumentStore<B>) -> DocumentStoreResult<()> {
        self.validate(store).await?;
        self.persist(store).await
    }

    pub(crate) fn persist<'a, B: Database>(
        &'a mut self,
        store: &'a DocumentStore<B>,
    ) -> BoxFuture<'a, DocumentStoreResult<()>> {
        async move {
            let schema = self.schema.clone();

            for field in schema.reference_fields().iter().chain(schema.embedded_fields()) {
                if let Some(property) = schema.property(field) {
                    property.save_child(self, store).await?;
                }
            }

            if schema.is_embedded() {
                return Ok(());
            }

            if schema.inheritance_enabled() {
                self.record.insert(CLASSES_FIELD, schema.tag());
                self.record.insert(CLASS_NAME_FIELD, schema.name());
            }

            let manager = store.manager_for(&schema)?;
            let id = manager.save(self.record.clone()).await?;
            self.record.insert(ID_FIELD, id);

            debug!(schema = schema.name(), id = %id, "saved document");
            Ok(())
        }
        .boxed()
    }

    /// Deletes the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotSaved`] if the document was never saved.
    pub async fn remove<B: Database>(&self, store: &DocumentStore<B>) -> DocumentStoreResult<()> {
        let id = self.id()?;
        store.manager_for(&self.schema)?.remove(&id).await
    }

    fn unknown_field(&self, name: &str) -> DocumentStoreError {
        DocumentStoreError::UnknownField(name.to_string(), self.schema.name().to_string())
    }
}

fn document_property<'s>(schema: &'s Schema, name: &str, reference: bool) -> DocumentStoreResult<&'s Property> {
    let property = schema.property(name).ok_or_else(|| {
        DocumentStoreError::UnknownField(name.to_string(), schema.name().to_string())
    })?;

    match (property.kind(), reference) {
        (PropertyKind::Reference(_), true) | (PropertyKind::Embedded(_), false) => Ok(property),
        _ => Err(DocumentStoreError::InvalidDocument(format!(
            "field {} is not {} field",
            name,
            if reference { "a reference" } else { "an embedded" }
        ))),
    }
}

fn mismatch(name: &str, expected: &str, found: &Bson) -> DocumentStoreError {
    DocumentStoreError::InvalidDocument(format!(
        "field {} is not {} (found {:?})",
        name,
        expected,
        found.element_type()
    ))
}
