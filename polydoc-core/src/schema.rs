//! Schema declaration and the registry that aggregates inherited fields.
//!
//! A schema is declared with a [`SchemaBuilder`] and registered once with a
//! [`SchemaRegistry`]. Registration merges the properties of every parent schema into the
//! new one (own declarations win), resolves the collection name, derives the required,
//! unique, reference and embedded field sets, and records the new schema as a descendant
//! of each ancestor so queries against a base type can materialize subtypes.
//!
//! ```ignore
//! use polydoc::schema::SchemaBuilder;
//! use polydoc::property::Property;
//!
//! let shape = SchemaBuilder::new("Shape").inheritance(true).property("name", Property::string());
//! let rectangle = SchemaBuilder::new("Rectangle")
//!     .extends("Shape")
//!     .property("width", Property::float())
//!     .property("height", Property::float());
//! ```

use bson::Document as RawDocument;
use indexmap::IndexMap;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tracing::debug;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    property::{Property, PropertyKind},
};

/// Reserved field holding the stored identifier.
pub const ID_FIELD: &str = "_id";
/// Reserved field holding the ancestor names plus the own type name.
pub const CLASSES_FIELD: &str = "_classes";
/// Reserved field holding the most-derived type name of a stored record.
pub const CLASS_NAME_FIELD: &str = "_class_name";

/// Names starting with `_` belong to the mapping layer.
pub(crate) fn is_reserved(field: &str) -> bool {
    field.starts_with('_')
}

/// The aggregated, inheritance-resolved definition of one document type.
#[derive(Debug)]
pub struct Schema {
    name: String,
    collection: Option<String>,
    properties: IndexMap<String, Property>,
    required: Vec<String>,
    unique: Vec<String>,
    references: Vec<String>,
    embedded_fields: Vec<String>,
    ancestors: Vec<String>,
    parents: Vec<String>,
    inheritance_enabled: bool,
    expandable: bool,
    embedded: bool,
}

impl Schema {
    /// The registered type name, also stored as the class tag.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection the schema's records are stored in.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::CollectionNotFound`] for embedded schemas, which are
    /// only ever stored inside their owner.
    pub fn collection(&self) -> DocumentStoreResult<&str> {
        self.collection
            .as_deref()
            .ok_or_else(|| DocumentStoreError::CollectionNotFound(self.name.clone()))
    }

    /// Every field, inherited ones included, keyed by name.
    pub fn properties(&self) -> &IndexMap<String, Property> {
        &self.properties
    }

    /// The declared or inherited property called `name`.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Declared field names, inherited fields first, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Required fields, including every unique field.
    pub fn required_fields(&self) -> &[String] {
        &self.required
    }

    /// Fields whose values must not repeat within the class.
    pub fn unique_fields(&self) -> &[String] {
        &self.unique
    }

    /// Fields holding pointers to independently stored documents.
    pub fn reference_fields(&self) -> &[String] {
        &self.references
    }

    /// Fields holding documents inlined into this record.
    pub fn embedded_fields(&self) -> &[String] {
        &self.embedded_fields
    }

    /// Every ancestor schema name, root first.
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Direct parents, in declaration order.
    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    /// Whether the schema may be extended. Inherited from the root.
    pub fn inheritance_enabled(&self) -> bool {
        self.inheritance_enabled
    }

    /// Whether instances may install extra fields with [`crate::document::Document::expand`].
    pub fn is_expandable(&self) -> bool {
        self.expandable
    }

    /// Whether documents of this schema only live inside an owner's record.
    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    /// Whether this schema is `name` or inherits from it.
    pub fn is_a(&self, name: &str) -> bool {
        self.name == name || self.ancestors.iter().any(|ancestor| ancestor == name)
    }

    /// The polymorphic tag stamped on saved records: ancestors followed by the own name.
    pub fn tag(&self) -> Vec<String> {
        let mut tag = self.ancestors.clone();
        tag.push(self.name.clone());
        tag
    }
}

/// Declares a schema before registration.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    collection: Option<String>,
    parents: Vec<String>,
    properties: IndexMap<String, Property>,
    inheritance: Option<bool>,
    expandable: Option<bool>,
    embedded: bool,
}

impl SchemaBuilder {
    /// Starts a schema for documents stored in their own collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            parents: Vec::new(),
            properties: IndexMap::new(),
            inheritance: None,
            expandable: None,
            embedded: false,
        }
    }

    /// Starts a schema for documents that only live inlined in another document.
    pub fn embedded(name: impl Into<String>) -> Self {
        Self { embedded: true, ..Self::new(name) }
    }

    /// Overrides the collection name. Defaults to the nearest ancestor's collection,
    /// then the lowercased schema name.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Adds a direct parent schema, which must already be registered.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    /// Declares a field. A later declaration of the same name replaces the earlier one.
    pub fn property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    /// Allows other schemas to extend this one. Inherited from parents when unset.
    pub fn inheritance(mut self, enabled: bool) -> Self {
        self.inheritance = Some(enabled);
        self
    }

    /// Allows instances to install ad hoc fields. Inherited from parents when unset.
    pub fn expandable(mut self, expandable: bool) -> Self {
        self.expandable = Some(expandable);
        self
    }
}

/// Every registered schema, with descendant tracking for polymorphic reads.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
    descendants: HashMap<String, BTreeSet<String>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregates and registers a schema.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::SchemaDefinition`] when the name is taken, a parent is
    /// unknown, embedded and stored parents are mixed, or inheritance is not enabled along
    /// the chain. Nothing is registered on failure.
    pub fn register(&mut self, builder: SchemaBuilder) -> DocumentStoreResult<Arc<Schema>> {
        let SchemaBuilder { name, collection, parents, properties: declared, inheritance, expandable, embedded } =
            builder;

        if self.schemas.contains_key(&name) {
            return Err(DocumentStoreError::SchemaDefinition(format!(
                "schema {} is already registered",
                name
            )));
        }

        let mut properties = IndexMap::new();
        let mut ancestors: Vec<String> = Vec::new();
        let mut inherited_collection = None;
        let mut inherited_inheritance = None;
        let mut inherited_expandable = None;

        for parent_name in &parents {
            let parent = self.schemas.get(parent_name).ok_or_else(|| {
                DocumentStoreError::SchemaDefinition(format!(
                    "schema {} extends unknown schema {}",
                    name, parent_name
                ))
            })?;

            if parent.is_embedded() != embedded {
                return Err(DocumentStoreError::SchemaDefinition(format!(
                    "schema {} cannot mix embedded and stored parents ({})",
                    name, parent_name
                )));
            }

            if !parent.inheritance_enabled() {
                return Err(DocumentStoreError::SchemaDefinition(format!(
                    "schema {} cannot extend {}: inheritance is not enabled",
                    name, parent_name
                )));
            }

            for (field, property) in parent.properties() {
                properties.insert(field.clone(), property.clone());
            }

            for ancestor in parent.ancestors().iter().chain(std::iter::once(&parent.name)) {
                if !ancestors.contains(ancestor) {
                    ancestors.push(ancestor.clone());
                }
            }

            inherited_collection = inherited_collection.or_else(|| parent.collection.clone());
            inherited_inheritance = inherited_inheritance.or(Some(parent.inheritance_enabled()));
            inherited_expandable = inherited_expandable.or(Some(parent.is_expandable()));
        }

        for (field, property) in declared {
            if is_reserved(&field) {
                return Err(DocumentStoreError::SchemaDefinition(format!(
                    "field {} of schema {} uses a reserved name",
                    field, name
                )));
            }
            properties.insert(field, property);
        }

        let inheritance_enabled = inheritance.or(inherited_inheritance).unwrap_or(false);
        if !ancestors.is_empty() && !inheritance_enabled {
            return Err(DocumentStoreError::SchemaDefinition(format!(
                "schema {} extends {} but disables inheritance",
                name,
                ancestors.join(", ")
            )));
        }

        if let Some(missing) = ancestors.iter().find(|ancestor| !self.descendants.contains_key(*ancestor)) {
            return Err(DocumentStoreError::SchemaDefinition(format!(
                "schema {} has no descendant tracking",
                missing
            )));
        }

        let collection = match embedded {
            true => None,
            false => Some(collection.or(inherited_collection).unwrap_or_else(|| name.to_lowercase())),
        };

        let mut required = Vec::new();
        let mut unique = Vec::new();
        let mut references = Vec::new();
        let mut embedded_fields = Vec::new();

        for (field, property) in properties.iter_mut() {
            property.attach(field, &name);

            if property.is_required() {
                required.push(field.clone());
            }
            if property.is_unique() {
                unique.push(field.clone());
            }
            match property.kind() {
                PropertyKind::Reference(_) => references.push(field.clone()),
                PropertyKind::Embedded(_) => embedded_fields.push(field.clone()),
                _ => {}
            }
        }

        let schema = Arc::new(Schema {
            name: name.clone(),
            collection,
            properties,
            required,
            unique,
            references,
            embedded_fields,
            ancestors,
            parents,
            inheritance_enabled,
            expandable: expandable.or(inherited_expandable).unwrap_or(false),
            embedded,
        });

        for ancestor in &schema.ancestors {
            if let Some(descendants) = self.descendants.get_mut(ancestor) {
                descendants.insert(name.clone());
            }
        }

        if inheritance_enabled {
            self.descendants.insert(name.clone(), BTreeSet::new());
        }

        debug!(
            schema = %name,
            collection = schema.collection.as_deref().unwrap_or("<embedded>"),
            fields = schema.properties.len(),
            ancestors = schema.ancestors.len(),
            "registered schema"
        );

        self.schemas.insert(name, schema.clone());
        Ok(schema)
    }

    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnknownSchema`] if no schema has that name.
    pub fn get(&self, name: &str) -> DocumentStoreResult<Arc<Schema>> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| DocumentStoreError::UnknownSchema(name.to_string()))
    }

    /// Whether a schema called `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Names of every registered schema inheriting from `name`.
    pub fn descendants<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        self.descendants.get(name).into_iter().flatten().map(String::as_str)
    }

    /// Picks the schema to materialize `record` with when it was read through `nominal`.
    ///
    /// The stored class name selects an ancestor or a descendant of `nominal` when it names
    /// one; otherwise `nominal` itself is used.
    pub fn resolve_record_schema(&self, nominal: &Arc<Schema>, record: &RawDocument) -> Arc<Schema> {
        if !nominal.inheritance_enabled() {
            return nominal.clone();
        }

        let Ok(class_name) = record.get_str(CLASS_NAME_FIELD) else {
            return nominal.clone();
        };

        let related = nominal.ancestors().iter().any(|ancestor| ancestor == class_name)
            || self
                .descendants
                .get(nominal.name())
                .is_some_and(|descendants| descendants.contains(class_name));

        match related {
            true => self.schemas.get(class_name).cloned().unwrap_or_else(|| nominal.clone()),
            false => nominal.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn shapes() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                SchemaBuilder::new("Shape")
                    .inheritance(true)
                    .property("name", Property::string()),
            )
            .unwrap();
        registry
            .register(
                SchemaBuilder::new("Rectangle")
                    .extends("Shape")
                    .property("width", Property::float())
                    .property("height", Property::float()),
            )
            .unwrap();
        registry
            .register(
                SchemaBuilder::new("Circle")
                    .extends("Shape")
                    .property("radius", Property::float()),
            )
            .unwrap();
        registry
            .register(SchemaBuilder::new("Square").extends("Rectangle"))
            .unwrap();
        registry
    }

    #[test]
    fn properties_aggregate_along_the_chain() {
        let registry = shapes();
        let square = registry.get("Square").unwrap();

        assert_eq!(square.field_names().collect::<Vec<_>>(), vec!["name", "width", "height"]);
        assert_eq!(square.ancestors(), ["Shape".to_string(), "Rectangle".to_string()]);
        assert_eq!(square.tag(), vec!["Shape", "Rectangle", "Square"]);
        assert_eq!(square.property("width").unwrap().owner(), Some("Square"));
        assert_eq!(registry.get("Rectangle").unwrap().property("width").unwrap().owner(), Some("Rectangle"));
    }

    #[test]
    fn collection_name_resolution() {
        let registry = shapes();
        assert_eq!(registry.get("Shape").unwrap().collection().unwrap(), "shape");
        assert_eq!(registry.get("Square").unwrap().collection().unwrap(), "shape");

        let mut registry = SchemaRegistry::new();
        let explicit = registry
            .register(SchemaBuilder::new("Test").collection("tests"))
            .unwrap();
        assert_eq!(explicit.collection().unwrap(), "tests");

        let address = registry.register(SchemaBuilder::embedded("Address")).unwrap();
        assert!(matches!(address.collection(), Err(DocumentStoreError::CollectionNotFound(_))));
    }

    #[test]
    fn own_declarations_override_inherited_ones() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                SchemaBuilder::new("Base")
                    .inheritance(true)
                    .property("title", Property::string()),
            )
            .unwrap();
        let child = registry
            .register(
                SchemaBuilder::new("Child")
                    .extends("Base")
                    .property("title", Property::string().required()),
            )
            .unwrap();

        assert!(child.property("title").unwrap().is_required());
        assert!(!registry.get("Base").unwrap().property("title").unwrap().is_required());
        assert_eq!(child.required_fields(), ["title".to_string()]);
    }

    #[test]
    fn derived_field_sets() {
        let mut registry = SchemaRegistry::new();
        let post = registry
            .register(
                SchemaBuilder::new("Post")
                    .property("login", Property::string().unique())
                    .property("title", Property::string().required())
                    .property("author", Property::reference("User"))
                    .property("address", Property::embedded("Address")),
            )
            .unwrap();

        assert_eq!(post.required_fields(), ["login".to_string(), "title".to_string()]);
        assert_eq!(post.unique_fields(), ["login".to_string()]);
        assert_eq!(post.reference_fields(), ["author".to_string()]);
        assert_eq!(post.embedded_fields(), ["address".to_string()]);
    }

    #[test]
    fn extending_without_inheritance_fails() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(SchemaBuilder::new("Closed").property("title", Property::string()))
            .unwrap();

        let err = registry
            .register(SchemaBuilder::new("Open").extends("Closed"))
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::SchemaDefinition(_)));
        assert!(!registry.contains("Open"));
    }

    #[test]
    fn disabling_inheritance_on_a_subtype_fails() {
        let mut registry = shapes();
        let err = registry
            .register(SchemaBuilder::new("Triangle").extends("Shape").inheritance(false))
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::SchemaDefinition(_)));
        assert_eq!(registry.descendants("Shape").count(), 3);
    }

    #[test]
    fn unknown_and_duplicate_schemas_fail() {
        let mut registry = shapes();
        assert!(registry.register(SchemaBuilder::new("Shape")).is_err());
        assert!(registry.register(SchemaBuilder::new("Oval").extends("Ellipse")).is_err());
        assert!(registry.register(SchemaBuilder::embedded("Patch").extends("Shape")).is_err());
        assert!(matches!(registry.get("Oval"), Err(DocumentStoreError::UnknownSchema(_))));
    }

    #[test]
    fn reserved_field_names_are_rejected() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .register(SchemaBuilder::new("Person").property("_classes", Property::list()))
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::SchemaDefinition(_)));
    }

    #[test]
    fn descendants_are_tracked_transitively() {
        let registry = shapes();
        assert_eq!(registry.descendants("Shape").collect::<Vec<_>>(), vec!["Circle", "Rectangle", "Square"]);
        assert_eq!(registry.descendants("Rectangle").collect::<Vec<_>>(), vec!["Square"]);
        assert_eq!(registry.descendants("Circle").count(), 0);
    }

    #[test]
    fn record_schema_follows_the_stored_class_name() {
        let registry = shapes();
        let shape = registry.get("Shape").unwrap();
        let rectangle = registry.get("Rectangle").unwrap();

        let square = doc! { "_class_name": "Square" };
        assert_eq!(registry.resolve_record_schema(&shape, &square).name(), "Square");
        assert_eq!(registry.resolve_record_schema(&rectangle, &square).name(), "Square");

        let base = doc! { "_class_name": "Shape" };
        assert_eq!(registry.resolve_record_schema(&rectangle, &base).name(), "Shape");

        let circle = doc! { "_class_name": "Circle" };
        assert_eq!(registry.resolve_record_schema(&rectangle, &circle).name(), "Rectangle");

        assert_eq!(registry.resolve_record_schema(&shape, &doc! {}).name(), "Shape");
    }

    #[test]
    fn expandable_is_inherited() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(SchemaBuilder::new("Loose").inheritance(true).expandable(true))
            .unwrap();
        let child = registry.register(SchemaBuilder::new("Looser").extends("Loose")).unwrap();
        assert!(child.is_expandable());
        assert!(child.inheritance_enabled());
    }
}
