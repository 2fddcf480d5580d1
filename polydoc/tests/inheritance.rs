use polydoc::{
    bson::Bson,
    memory::InMemoryStore,
    prelude::*,
};

fn shapes() -> DocumentStore<InMemoryStore> {
    let mut store = DocumentStore::new(InMemoryStore::new());
    store
        .register(
            SchemaBuilder::new("Shape")
                .inheritance(true)
                .property("x", Property::any())
                .property("y", Property::any()),
        )
        .unwrap();
    store
        .register(SchemaBuilder::new("Rectangle").extends("Shape").property("rect", Property::any()))
        .unwrap();
    store
        .register(SchemaBuilder::new("Circle").extends("Shape").property("cir", Property::any()))
        .unwrap();
    store
        .register(SchemaBuilder::new("Square").extends("Rectangle").property("squ", Property::any()))
        .unwrap();
    store
}

async fn class_names(store: &DocumentStore<InMemoryStore>, schema: &str) -> Vec<String> {
    store
        .manager(schema)
        .unwrap()
        .all()
        .to_vec()
        .await
        .unwrap()
        .iter()
        .map(|document| document.class_name().to_string())
        .collect()
}

#[tokio::test]
async fn polymorphic_queries() {
    let store = shapes();

    for name in ["Shape", "Rectangle", "Circle", "Square"] {
        store.create(name).unwrap().save(&store).await.unwrap();
    }

    assert_eq!(class_names(&store, "Shape").await, vec!["Shape", "Rectangle", "Circle", "Square"]);
    assert_eq!(class_names(&store, "Rectangle").await, vec!["Rectangle", "Square"]);
    assert_eq!(class_names(&store, "Circle").await, vec!["Circle"]);
    assert_eq!(class_names(&store, "Square").await, vec!["Square"]);

    assert_eq!(store.list_collections().await.unwrap(), vec!["shape"]);
}

#[tokio::test]
async fn records_carry_their_type_tag() {
    let store = shapes();

    let mut square = store.create_with("Square", [("squ", 4)]).unwrap();
    square.save(&store).await.unwrap();

    assert_eq!(
        square.record().get("_classes"),
        Some(&Bson::from(vec!["Shape", "Rectangle", "Square"]))
    );
    assert_eq!(square.record().get_str("_class_name").unwrap(), "Square");

    // A base-type lookup materializes the stored subtype, inherited fields included.
    let found = store.manager("Shape").unwrap().get(square.id().unwrap()).await.unwrap().unwrap();
    assert_eq!(found.class_name(), "Square");
    assert!(found.property("rect").is_some());
    assert_eq!(found.get("squ").unwrap(), Bson::Int32(4));

    let circle = store
        .manager("Circle")
        .unwrap()
        .find_one(Filter::eq("squ", 4))
        .await
        .unwrap();
    assert!(circle.is_none());
}

#[tokio::test]
async fn scoped_cursor_operations() {
    let store = shapes();

    for (name, x) in [("Shape", 1), ("Rectangle", 2), ("Square", 3), ("Circle", 4), ("Square", 5)] {
        store.create_with(name, [("x", x)]).unwrap().save(&store).await.unwrap();
    }

    let rectangles = store.manager("Rectangle").unwrap();
    assert_eq!(rectangles.all().count().await.unwrap(), 3);
    assert_eq!(rectangles.find(Filter::gt("x", 2)).count().await.unwrap(), 2);

    let largest = rectangles
        .all()
        .sort("x", SortDirection::Desc)
        .nth(0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(largest.get("x").unwrap(), Bson::Int32(5));
    assert_eq!(largest.class_name(), "Square");

    // The collection-level count sees every sibling type.
    assert_eq!(rectangles.count(None::<Expr>).await.unwrap(), 5);
}

#[tokio::test]
async fn polymorphic_references() {
    let mut store = shapes();
    store
        .register(SchemaBuilder::new("Canvas").property("focus", Property::reference("Shape")))
        .unwrap();

    let mut canvas = store.create("Canvas").unwrap();
    canvas
        .set_reference("focus", store.create_with("Circle", [("cir", 2.5)]).unwrap())
        .unwrap();
    canvas.save(&store).await.unwrap();

    let mut canvas = store.manager("Canvas").unwrap().find_one(None::<Expr>).await.unwrap().unwrap();
    let focus = canvas.reference(&store, "focus").await.unwrap().unwrap();
    assert_eq!(focus.class_name(), "Circle");
    assert_eq!(focus.get("cir").unwrap(), Bson::Double(2.5));
}

#[tokio::test]
async fn inheritance() {
    let mut store = DocumentStore::new(InMemoryStore::new());
    let a = store
        .register(SchemaBuilder::new("A").inheritance(true).property("x", Property::any()))
        .unwrap();
    let b = store
        .register(SchemaBuilder::new("B").extends("A").property("y", Property::any()))
        .unwrap();

    assert!(b.property("x").is_some());
    assert!(b.property("y").is_some());
    assert_eq!(b.property("x").unwrap().owner(), Some("B"));
    assert_eq!(a.collection().unwrap(), b.collection().unwrap());
    assert_eq!(b.ancestors(), ["A".to_string()]);
    assert_eq!(store.registry().descendants("A").collect::<Vec<_>>(), vec!["B"]);
}

#[tokio::test]
async fn disabled_inheritance() {
    let mut store = DocumentStore::new(InMemoryStore::new());
    store.register(SchemaBuilder::new("A")).unwrap();

    assert!(matches!(
        store.register(SchemaBuilder::new("B").extends("A")),
        Err(DocumentStoreError::SchemaDefinition(_))
    ));
    assert!(matches!(store.schema("B"), Err(DocumentStoreError::UnknownSchema(_))));

    // Without inheritance no type tag is stored.
    let mut a = store.create("A").unwrap();
    a.save(&store).await.unwrap();
    assert!(!a.record().contains_key("_classes"));
}
