use polydoc::{
    bson::{Binary, Bson, DateTime, doc, oid::ObjectId, spec::BinarySubtype},
    memory::InMemoryStore,
    prelude::*,
};

fn person_store(builder: SchemaBuilder) -> DocumentStore<InMemoryStore> {
    let mut store = DocumentStore::new(InMemoryStore::with_database_name("mongoltest"));
    store.register(builder).unwrap();
    store
}

fn person() -> SchemaBuilder {
    SchemaBuilder::new("Person")
}

#[tokio::test]
async fn required_values() {
    let store = person_store(
        person()
            .property("name", Property::string().required())
            .property("age", Property::integer().required())
            .property("email", Property::email()),
    );

    let person = store.create_with("Person", [("name", "Slash")]).unwrap();
    let err = person.validate_fields().unwrap_err();
    assert_eq!(err.field.as_deref(), Some("age"));
    assert_eq!(err.message, "age is required");

    let person = store.create_with("Person", [("age", 30)]).unwrap();
    assert!(person.validate_fields().is_err());

    // An empty string does not satisfy a required field; zero does.
    let person = store
        .create_with("Person", [("name", Bson::from("")), ("age", Bson::from(0))])
        .unwrap();
    assert!(person.validate_fields().is_err());

    let mut person = store
        .create_with("Person", [("name", Bson::from("Slash")), ("age", Bson::from(0))])
        .unwrap();
    person.validate_fields().unwrap();

    // Nothing is written when validation fails.
    let mut invalid = store.create_with("Person", [("name", "Axl")]).unwrap();
    assert!(matches!(invalid.save(&store).await, Err(DocumentStoreError::Validation(_))));
    assert!(store.list_collections().await.unwrap().is_empty());

    person.save(&store).await.unwrap();
    assert_eq!(store.list_collections().await.unwrap(), vec!["person"]);
}

#[tokio::test]
async fn unique_value() {
    let store = person_store(person().property("userid", Property::string().unique()));

    let mut slash = store.create_with("Person", [("userid", "slash")]).unwrap();
    slash.save(&store).await.unwrap();

    let duplicate = store.create_with("Person", [("userid", "slash")]).unwrap();
    match duplicate.validate(&store).await {
        Err(DocumentStoreError::Validation(err)) => {
            assert_eq!(err.message, "Value slash for userid exists already");
        }
        other => panic!("expected a validation error, got {:?}", other),
    }

    // A document does not collide with its own stored record.
    slash.save(&store).await.unwrap();

    // Unique fields are required.
    let anonymous = store.create("Person").unwrap();
    assert!(anonymous.validate_fields().is_err());
}

#[tokio::test]
async fn unique_binary_value() {
    let mut store = DocumentStore::new(InMemoryStore::new());
    store
        .register(SchemaBuilder::new("Blob").property("hash", Property::binary().unique()))
        .unwrap();
    let hash = |bytes: &[u8]| Binary { subtype: BinarySubtype::Generic, bytes: bytes.to_vec() };

    let mut first = store.create_with("Blob", [("hash", hash(&[1, 2, 3]))]).unwrap();
    first.save(&store).await.unwrap();

    let mut second = store.create_with("Blob", [("hash", hash(&[9, 9, 9]))]).unwrap();
    second.save(&store).await.unwrap();

    let blobs = store.manager("Blob").unwrap();
    assert_eq!(blobs.find(Filter::eq("hash", hash(&[9, 9, 9]))).count().await.unwrap(), 1);
    assert_eq!(blobs.find(Filter::eq("hash", hash(&[4, 5, 6]))).count().await.unwrap(), 0);

    let duplicate = store.create_with("Blob", [("hash", hash(&[1, 2, 3]))]).unwrap();
    assert!(matches!(duplicate.validate(&store).await, Err(DocumentStoreError::Validation(_))));
}

#[tokio::test]
async fn defaults_are_validated() {
    let store = person_store(
        person().property(
            "age",
            Property::integer().with_default(5).validator(NumberRange::at_least(10.0)),
        ),
    );

    let mut person = store.create("Person").unwrap();
    assert_eq!(person.get_i64("age").unwrap(), 5);
    let err = person.validate_fields().unwrap_err();
    assert_eq!(err.field.as_deref(), Some("age"));
    assert!(matches!(person.save(&store).await, Err(DocumentStoreError::Validation(_))));

    person.set("age", 30).unwrap();
    person.validate_fields().unwrap();
}

#[tokio::test]
async fn objectid_property() {
    let store = person_store(person().property("name", Property::string()));

    let mut person = store.create_with("Person", [("name", "Slash")]).unwrap();
    assert_eq!(person.get("_id").unwrap(), Bson::Null);

    person.set("_id", 47).unwrap();
    assert_eq!(person.validate_fields().unwrap_err().message, "Invalid Object ID");

    person.set("_id", "abc").unwrap();
    assert!(person.validate_fields().is_err());

    person.set("_id", "4c98c26624a7264cef000011").unwrap();
    person.validate_fields().unwrap();
    assert_eq!(person.id().unwrap().to_hex(), "4c98c26624a7264cef000011");
}

#[tokio::test]
async fn string_property() {
    let store = person_store(person().property("name", Property::string()));

    let person = store.create_with("Person", [("name", 30)]).unwrap();
    assert_eq!(person.validate_fields().unwrap_err().message, "The value must be a string");

    store.create_with("Person", [("name", "hallo")]).unwrap().validate_fields().unwrap();
    store.create_with("Person", [("name", "")]).unwrap().validate_fields().unwrap();
}

#[tokio::test]
async fn string_length() {
    let store = person_store(person().property("name", Property::string().validator(Length::between(2, 5))));

    store.create_with("Person", [("name", "Axl")]).unwrap().validate_fields().unwrap();
    let err = store
        .create_with("Person", [("name", "Yuanhao")])
        .unwrap()
        .validate_fields()
        .unwrap_err();
    assert_eq!(err.to_string(), "name: Value length must be between 2 and 5");
}

#[tokio::test]
async fn email_property() {
    let store = person_store(person().property("email", Property::email()));

    let err = store
        .create_with("Person", [("email", "spam@spam")])
        .unwrap()
        .validate_fields()
        .unwrap_err();
    assert_eq!(err.message, "Invalid email address");

    store
        .create_with("Person", [("email", "spam@nospam.com")])
        .unwrap()
        .validate_fields()
        .unwrap();
}

#[tokio::test]
async fn ip_property() {
    let store = person_store(person().property("ip", Property::ip_address()));

    for invalid in ["256.1.1", "256.1.1.1"] {
        assert!(store.create_with("Person", [("ip", invalid)]).unwrap().validate_fields().is_err());
    }
    store.create_with("Person", [("ip", "192.168.0.1")]).unwrap().validate_fields().unwrap();
}

#[tokio::test]
async fn url_property() {
    let store = person_store(
        person()
            .property("url", Property::url(true))
            .property("intranet", Property::url(false)),
    );

    assert!(store.create_with("Person", [("url", "http://google")]).unwrap().validate_fields().is_err());
    store.create_with("Person", [("url", "http://google.com")]).unwrap().validate_fields().unwrap();
    store
        .create_with("Person", [("intranet", "http://localhost:8080/wiki")])
        .unwrap()
        .validate_fields()
        .unwrap();
}

#[tokio::test]
async fn int_property() {
    let store = person_store(
        person().property("age", Property::integer().validator(NumberRange::between(1.0, 80.0))),
    );

    let mut person = store.create_with("Person", [("age", 30)]).unwrap();
    person.validate_fields().unwrap();

    person.set("age", 100).unwrap();
    assert!(person.validate_fields().is_err());

    person.set("age", -1).unwrap();
    assert!(person.validate_fields().is_err());

    person.set("age", "30").unwrap();
    assert_eq!(person.validate_fields().unwrap_err().message, "The value must be an integer");
}

#[tokio::test]
async fn boolean_property() {
    let store = person_store(person().property("married", Property::boolean()));

    let mut person = store.create_with("Person", [("married", "True")]).unwrap();
    assert!(person.validate_fields().is_err());

    person.set("married", true).unwrap();
    person.validate_fields().unwrap();
    assert!(person.get_bool("married").unwrap());
}

#[tokio::test]
async fn float_property() {
    let store = person_store(
        person().property("height", Property::float().validator(NumberRange::between(1.2, 2.2))),
    );

    let mut person = store.create("Person").unwrap();
    person.set("height", 1.70).unwrap();
    person.validate_fields().unwrap();

    for invalid in [Bson::from("2.0"), Bson::from(2), Bson::from(1.19), Bson::from(2.21)] {
        person.set("height", invalid).unwrap();
        assert!(person.validate_fields().is_err());
    }
}

#[tokio::test]
async fn geo_property() {
    let store = person_store(person().property("loc", Property::geo_point()));

    let mut person = store.create("Person").unwrap();
    person.set("loc", 5).unwrap();
    assert!(person.validate_fields().is_err());

    person.set("loc", vec![39.9074977, 116.3972282]).unwrap();
    person.validate_fields().unwrap();
}

#[tokio::test]
async fn datetime_property() {
    let store = person_store(
        person()
            .property("joined", Property::datetime())
            .property("seen", Property::datetime().with_default_fn(|| Bson::DateTime(DateTime::now()))),
    );

    let mut person = store.create("Person").unwrap();
    assert!(person.get_datetime("seen").is_ok());

    let now = chrono::Utc::now();
    person.set("joined", now).unwrap();
    person.validate_fields().unwrap();
    assert_eq!(
        person.get_datetime("joined").unwrap().timestamp_millis(),
        now.timestamp_millis()
    );

    person.set("joined", "2012-12-25").unwrap();
    assert_eq!(person.validate_fields().unwrap_err().message, "Invalid datetime type");
}

#[tokio::test]
async fn custom_validators() {
    let store = person_store(
        person()
            .property(
                "nick",
                Property::string().validator(
                    Regexp::new("^[a-z]+$").unwrap().with_message("Nicknames are lowercase letters"),
                ),
            )
            .property(
                "lucky",
                Property::integer().validator(Predicate::new(
                    "even",
                    |value| value.as_i64().is_some_and(|n| n % 2 == 0),
                    "Lucky numbers are even",
                )),
            ),
    );

    let mut person = store.create_with("Person", [("nick", "slash")]).unwrap();
    person.validate_fields().unwrap();

    person.set("nick", "Slash").unwrap();
    assert_eq!(person.validate_fields().unwrap_err().message, "Nicknames are lowercase letters");

    person.set("nick", "slash").unwrap();
    person.set("lucky", 7).unwrap();
    assert_eq!(person.validate_fields().unwrap_err().to_string(), "lucky: Lucky numbers are even");

    assert!(Regexp::new("(").is_err());
}

#[tokio::test]
async fn referenced_doc() {
    let mut store = DocumentStore::new(InMemoryStore::with_database_name("mongoltest"));
    store
        .register(SchemaBuilder::new("Doc2").property("name", Property::string()))
        .unwrap();
    store
        .register(
            SchemaBuilder::new("Doc1")
                .property("name", Property::string())
                .property("doc", Property::reference("Doc2")),
        )
        .unwrap();
    store
        .register(
            SchemaBuilder::new("Doc")
                .property("name", Property::string())
                .property("doc", Property::reference("Doc1")),
        )
        .unwrap();

    let doc2 = store
        .create_with("Doc2", [("name", "I'm a referenced doc in a referenced doc")])
        .unwrap();
    let mut doc1 = store.create_with("Doc1", [("name", "I'm a referenced doc")]).unwrap();
    doc1.set_reference("doc", doc2).unwrap();
    let mut doc = store.create_with("Doc", [("name", "I'm the most top doc")]).unwrap();
    doc.set_reference("doc", doc1).unwrap();

    let child = doc.reference(&store, "doc").await.unwrap().unwrap();
    assert_eq!(child.get_str("name").unwrap(), "I'm a referenced doc");
    let grandchild = child.reference(&store, "doc").await.unwrap().unwrap();
    assert_eq!(grandchild.get_str("name").unwrap(), "I'm a referenced doc in a referenced doc");

    doc.save(&store).await.unwrap();
    assert!(doc.id().is_ok());
    let child = doc.reference(&store, "doc").await.unwrap().unwrap();
    assert!(child.id().is_ok());
    let grandchild = child.reference(&store, "doc").await.unwrap().unwrap();
    assert!(grandchild.id().is_ok());

    let pointer = DbRef::from_bson(doc.record().get("doc").unwrap()).unwrap();
    assert_eq!(pointer.collection, "doc1");
    assert_eq!(pointer.database.as_deref(), Some("mongoltest"));

    let mut new_doc = store.manager("Doc").unwrap().find_one(None::<Expr>).await.unwrap().unwrap();
    let child = new_doc.reference(&store, "doc").await.unwrap().unwrap();
    assert_eq!(child.get_str("name").unwrap(), "I'm a referenced doc");
    let grandchild = child.reference(&store, "doc").await.unwrap().unwrap();
    assert_eq!(grandchild.get_str("name").unwrap(), "I'm a referenced doc in a referenced doc");

    let new_doc1 = store.manager("Doc1").unwrap().find_one(None::<Expr>).await.unwrap().unwrap();
    assert_eq!(new_doc1.get_str("name").unwrap(), "I'm a referenced doc");
    let new_doc2 = store.manager("Doc2").unwrap().find_one(None::<Expr>).await.unwrap().unwrap();
    assert_eq!(new_doc2.get_str("name").unwrap(), "I'm a referenced doc in a referenced doc");

    assert_eq!(store.list_collections().await.unwrap(), vec!["doc", "doc1", "doc2"]);
}

#[tokio::test]
async fn reference_by_pointer_and_dangling_reference() {
    let mut store = DocumentStore::new(InMemoryStore::new());
    store
        .register(SchemaBuilder::new("Person").property("name", Property::string()))
        .unwrap();
    store
        .register(SchemaBuilder::new("Post").property("author", Property::reference("Person")))
        .unwrap();

    let mut author = store.create_with("Person", [("name", "Slash")]).unwrap();
    author.save(&store).await.unwrap();
    let pointer = DbRef::new("person", author.id().unwrap(), None);

    let mut post = store.create_with("Post", [("author", pointer.clone())]).unwrap();
    post.save(&store).await.unwrap();
    assert_eq!(DbRef::from_bson(post.record().get("author").unwrap()), Some(pointer));

    author.remove(&store).await.unwrap();

    let mut post = store.manager("Post").unwrap().find_one(None::<Expr>).await.unwrap().unwrap();
    assert!(matches!(
        post.reference(&store, "author").await,
        Err(DocumentStoreError::DocumentNotFound(..))
    ));

    post.set("author", Bson::Null).unwrap();
    assert!(post.reference(&store, "author").await.unwrap().is_none());
}

#[tokio::test]
async fn embed_doc() {
    let mut store = DocumentStore::new(InMemoryStore::with_database_name("mongoltest"));
    store
        .register(SchemaBuilder::embedded("Doc2").property("name", Property::string()))
        .unwrap();
    store
        .register(
            SchemaBuilder::embedded("Doc1")
                .property("name", Property::string())
                .property("doc", Property::embedded("Doc2")),
        )
        .unwrap();
    store
        .register(
            SchemaBuilder::new("Doc")
                .property("name", Property::string())
                .property("doc", Property::embedded("Doc1")),
        )
        .unwrap();

    let doc2 = store.create_with("Doc2", [("name", "I'm a embed doc in a embed doc")]).unwrap();
    let mut doc1 = store.create_with("Doc1", [("name", "I'm a embed doc")]).unwrap();
    doc1.set_embedded("doc", doc2).unwrap();
    let mut doc = store.create_with("Doc", [("name", "I'm the most top doc")]).unwrap();
    doc.set_embedded("doc", doc1).unwrap();

    let child = doc.embedded(&store, "doc").unwrap().unwrap();
    assert_eq!(child.get_str("name").unwrap(), "I'm a embed doc");
    let grandchild = child.embedded(&store, "doc").unwrap().unwrap();
    assert_eq!(grandchild.get_str("name").unwrap(), "I'm a embed doc in a embed doc");

    doc.save(&store).await.unwrap();
    assert!(doc.id().is_ok());

    let child = doc.embedded(&store, "doc").unwrap().unwrap();
    assert!(child.object_id().is_none());
    assert_eq!(child.get("_id").unwrap(), Bson::Null);
    let grandchild = child.embedded(&store, "doc").unwrap().unwrap();
    assert!(grandchild.object_id().is_none());

    assert_eq!(
        doc.record().get_document("doc").unwrap(),
        &doc! {
            "name": "I'm a embed doc",
            "doc": { "name": "I'm a embed doc in a embed doc" },
        }
    );

    let mut new_doc = store.manager("Doc").unwrap().find_one(None::<Expr>).await.unwrap().unwrap();
    let child = new_doc.embedded(&store, "doc").unwrap().unwrap();
    assert_eq!(child.get_str("name").unwrap(), "I'm a embed doc");
    let grandchild = child.embedded(&store, "doc").unwrap().unwrap();
    assert_eq!(grandchild.get_str("name").unwrap(), "I'm a embed doc in a embed doc");

    assert_eq!(store.list_collections().await.unwrap(), vec!["doc"]);
    assert!(matches!(store.manager("Doc1"), Err(DocumentStoreError::CollectionNotFound(_))));
}

#[tokio::test]
async fn document_slots_check_their_kind() {
    let mut store = DocumentStore::new(InMemoryStore::new());
    store
        .register(SchemaBuilder::embedded("Address").property("country", Property::string()))
        .unwrap();
    store
        .register(SchemaBuilder::new("Band").property("name", Property::string()))
        .unwrap();
    store
        .register(
            SchemaBuilder::new("Person")
                .property("band", Property::reference("Band"))
                .property("address", Property::embedded("Address")),
        )
        .unwrap();

    let mut person = store.create("Person").unwrap();
    person.set_reference("band", store.create("Address").unwrap()).unwrap();
    assert_eq!(person.validate_fields().unwrap_err().message, "Invalid Document type");

    let mut person = store.create("Person").unwrap();
    person.set_embedded("address", store.create("Band").unwrap()).unwrap();
    assert_eq!(person.validate_fields().unwrap_err().message, "Invalid Document type");

    let mut person = store.create("Person").unwrap();
    let mut address = store.create_with("Address", [("country", "China")]).unwrap();
    address.set("_id", ObjectId::new()).unwrap();
    person.set_embedded("address", address).unwrap();
    assert_eq!(
        person.validate_fields().unwrap_err().message,
        "Embedded document must not have an identifier"
    );

    assert!(matches!(person.get("band"), Err(DocumentStoreError::InvalidDocument(_))));
    assert!(matches!(person.set("band", "Guns"), Err(DocumentStoreError::InvalidDocument(_))));
}

#[tokio::test]
async fn invalid_children_block_the_whole_save() {
    let mut store = DocumentStore::new(InMemoryStore::new());
    store
        .register(SchemaBuilder::new("Band").property("name", Property::string().required()))
        .unwrap();
    store
        .register(SchemaBuilder::embedded("Address").property("country", Property::string()))
        .unwrap();
    store
        .register(
            SchemaBuilder::new("Person")
                .property("name", Property::string().required())
                .property("band", Property::reference("Band"))
                .property("address", Property::embedded("Address")),
        )
        .unwrap();

    // Valid owner, unsaved referenced child missing a required field.
    let mut person = store.create_with("Person", [("name", "Slash")]).unwrap();
    person.set_reference("band", store.create("Band").unwrap()).unwrap();
    assert!(matches!(person.save(&store).await, Err(DocumentStoreError::Validation(_))));
    assert!(store.list_collections().await.unwrap().is_empty());

    // Valid owner, embedded child holding a value of the wrong type.
    let mut person = store.create_with("Person", [("name", "Slash")]).unwrap();
    person
        .set_embedded("address", store.create_with("Address", [("country", 86)]).unwrap())
        .unwrap();
    assert!(matches!(person.save(&store).await, Err(DocumentStoreError::Validation(_))));
    assert!(store.list_collections().await.unwrap().is_empty());
    assert!(person.id().is_err());
}
