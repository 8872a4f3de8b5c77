//! Round-trip and pipeline tests
//!
//! Exercises the full load → validate → normalize → write pipeline across
//! every physical encoding, and the properties that make output
//! reproducible: decode∘encode equals the normalized original, and graphs
//! differing only in insertion order serialize byte-identically.

use std::fs;
use std::sync::Arc;

use tablegraph::{
    AttributeDef, Cardinality, ClassDef, Differ, Format, LoadIssue, Normalizer, ObjectGraph,
    Reader, ScalarKind, SchemaRegistry, TableLayout, Validator, Value, Writer,
};

fn registry() -> Arc<SchemaRegistry> {
    Arc::new(
        SchemaRegistry::from_classes(vec![
            ClassDef::new(
                "Company",
                "name",
                vec![
                    AttributeDef::scalar("name", ScalarKind::String)
                        .with_help("Registered company name"),
                    AttributeDef::relation("employees", Cardinality::OneToMany, "Person", "employer"),
                    AttributeDef::relation("address", Cardinality::OneToOne, "Address", "tenant"),
                ],
            ),
            ClassDef::new(
                "Address",
                "street",
                vec![
                    AttributeDef::scalar("street", ScalarKind::String),
                    AttributeDef::scalar("city", ScalarKind::String),
                    AttributeDef::relation("tenant", Cardinality::OneToOne, "Company", "address"),
                ],
            )
            .with_layout(TableLayout::Inline),
            ClassDef::new(
                "Person",
                "id",
                vec![
                    AttributeDef::scalar("id", ScalarKind::String),
                    AttributeDef::scalar(
                        "email",
                        ScalarKind::Pattern {
                            regex: r"^\S+@\S+$".to_string(),
                        },
                    ),
                    AttributeDef::scalar("birthday", ScalarKind::Date),
                    AttributeDef::new("tags", tablegraph::AttributeKind::List(ScalarKind::String)),
                    AttributeDef::relation("employer", Cardinality::ManyToOne, "Company", "employees"),
                    AttributeDef::relation("projects", Cardinality::ManyToMany, "Project", "members"),
                ],
            ),
            ClassDef::new(
                "Project",
                "code",
                vec![
                    AttributeDef::scalar("code", ScalarKind::String),
                    AttributeDef::scalar("budget", ScalarKind::Float),
                    AttributeDef::relation("members", Cardinality::ManyToMany, "Person", "projects"),
                ],
            ),
        ])
        .unwrap(),
    )
}

fn str_val(s: &str) -> Value {
    Value::Str(s.to_string())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// A dataset touching every attribute kind and cardinality, with employee
/// insertion order controlled by the caller
fn sample_graph(employee_order: &[&str]) -> ObjectGraph {
    let mut graph = ObjectGraph::new(registry());

    let acme = graph
        .add_with_values("Company", &[("name", str_val("acme"))])
        .unwrap();
    let address = graph
        .add_with_values(
            "Address",
            &[("street", str_val("1 Main St")), ("city", str_val("Springfield"))],
        )
        .unwrap();
    graph.set_relationship_one(acme, "address", Some(address)).unwrap();

    let mut people = Vec::new();
    for id in employee_order {
        let p = graph
            .add_with_values(
                "Person",
                &[
                    ("id", str_val(id)),
                    ("email", str_val(&format!("{}@acme.example", id))),
                    ("birthday", Value::Date(chrono::NaiveDate::from_ymd_opt(1990, 7, 1).unwrap())),
                    (
                        "tags",
                        Value::List(vec![str_val("staff"), str_val("full-time")]),
                    ),
                ],
            )
            .unwrap();
        people.push(p);
    }
    graph.set_relationship(acme, "employees", &people).unwrap();

    let project = graph
        .add_with_values(
            "Project",
            &[("code", str_val("apollo")), ("budget", Value::Float(125000.5))],
        )
        .unwrap();
    graph.set_relationship(project, "members", &people).unwrap();

    graph
}

#[test]
fn test_sample_graph_is_valid() {
    let graph = sample_graph(&["ada", "bob"]);
    assert!(Validator::run(&graph).is_none());
}

#[test]
fn test_round_trip_every_format() {
    init_tracing();
    let graph = sample_graph(&["ada", "bob"]);
    let dir = tempfile::tempdir().unwrap();

    let destinations = [
        (dir.path().join("data.xlsx"), Format::Workbook),
        (dir.path().join("csv_dir"), Format::CsvDir),
        (dir.path().join("tsv_dir"), Format::TsvDir),
        (dir.path().join("data.csv"), Format::MultiCsv),
        (dir.path().join("data.tsv"), Format::MultiTsv),
        (dir.path().join("data.json"), Format::Tree),
    ];

    for (path, format) in destinations {
        Writer::new().run_format(&path, format, &graph).unwrap();
        let (reloaded, report) = Reader::new()
            .run_format(&path, format, registry())
            .unwrap();
        assert!(report.is_ok(), "{:?}: {}", format, report);
        assert!(
            Differ::equal(&graph, &reloaded),
            "{:?}: {}",
            format,
            Differ::run(&graph, &reloaded)
        );

        // decode∘encode equals the normalized original
        let mut normalized = graph.clone();
        Normalizer::run(&mut normalized);
        assert!(Differ::equal(&normalized, &reloaded));
    }
}

#[test]
fn test_insertion_order_does_not_change_bytes() {
    let a = sample_graph(&["ada", "bob"]);
    let b = sample_graph(&["bob", "ada"]);
    let dir = tempfile::tempdir().unwrap();

    let path_a = dir.path().join("a.csv");
    let path_b = dir.path().join("b.csv");
    Writer::new().run(&path_a, &a).unwrap();
    Writer::new().run(&path_b, &b).unwrap();

    let bytes_a = fs::read(&path_a).unwrap();
    let bytes_b = fs::read(&path_b).unwrap();
    assert_eq!(bytes_a, bytes_b);
}

#[test]
fn test_writer_emits_help_row_and_reader_skips_it() {
    let graph = sample_graph(&["ada"]);
    let tables = Writer::new().write_tables(&graph);
    let company = tables.get("Company").unwrap();
    assert!(company.rows[1][0].starts_with('#'));

    let (reloaded, report) = Reader::new().read_tables(&tables, registry()).unwrap();
    assert!(report.is_ok(), "{}", report);
    assert_eq!(reloaded.instances_of("Company").len(), 1);
}

#[test]
fn test_inline_address_round_trips_as_dotted_columns() {
    let graph = sample_graph(&["ada"]);
    let tables = Writer::new().write_tables(&graph);

    let company = tables.get("Company").unwrap();
    let header = &company.rows[0];
    assert!(header.contains(&"address.street".to_string()));
    assert!(header.contains(&"address.city".to_string()));
    // inline classes get no grid of their own
    assert!(tables.get("Address").is_none());

    let (reloaded, report) = Reader::new().read_tables(&tables, registry()).unwrap();
    assert!(report.is_ok(), "{}", report);
    let company = reloaded.instances_of("Company")[0];
    let address = reloaded.related_one(company, "address").unwrap();
    assert_eq!(reloaded.value(address, "city"), Some(&str_val("Springfield")));
    assert_eq!(reloaded.related_one(address, "tenant"), Some(company));
}

#[test]
fn test_column_layout_transposes_and_round_trips() {
    let registry = Arc::new(
        SchemaRegistry::from_classes(vec![ClassDef::new(
            "Parameter",
            "key",
            vec![
                AttributeDef::scalar("key", ScalarKind::String),
                AttributeDef::scalar("value", ScalarKind::Float),
                AttributeDef::scalar("units", ScalarKind::String),
            ],
        )
        .with_layout(TableLayout::Column)])
        .unwrap(),
    );

    let mut graph = ObjectGraph::new(Arc::clone(&registry));
    graph
        .add_with_values(
            "Parameter",
            &[
                ("key", str_val("kcat")),
                ("value", Value::Float(1.5)),
                ("units", str_val("1/s")),
            ],
        )
        .unwrap();
    graph
        .add_with_values(
            "Parameter",
            &[
                ("key", str_val("km")),
                ("value", Value::Float(0.2)),
                ("units", str_val("mM")),
            ],
        )
        .unwrap();

    // the physical grid holds one column per instance: attribute names run
    // down the first column, instances across
    let tables = Writer::new().write_tables(&graph);
    let grid = tables.get("Parameter").unwrap();
    assert_eq!(grid.rows[0], vec!["key", "kcat", "km"]);
    assert_eq!(grid.rows[2], vec!["units", "1/s", "mM"]);

    let dir = tempfile::tempdir().unwrap();
    for (file, format) in [
        ("params.csv", Format::MultiCsv),
        ("params.xlsx", Format::Workbook),
        ("params.json", Format::Tree),
    ] {
        let path = dir.path().join(file);
        Writer::new().run_format(&path, format, &graph).unwrap();
        let (reloaded, report) = Reader::new()
            .run_format(&path, format, Arc::clone(&registry))
            .unwrap();
        assert!(report.is_ok(), "{:?}: {}", format, report);
        assert!(Differ::equal(&graph, &reloaded), "{:?}", format);
    }
}

#[test]
fn test_three_cycle_round_trips_with_every_edge_intact() {
    let registry = Arc::new(
        SchemaRegistry::from_classes(vec![
            ClassDef::new(
                "Alpha",
                "id",
                vec![
                    AttributeDef::scalar("id", ScalarKind::String),
                    AttributeDef::relation("next", Cardinality::OneToOne, "Beta", "prev"),
                    AttributeDef::relation("prev", Cardinality::OneToOne, "Gamma", "next"),
                ],
            ),
            ClassDef::new(
                "Beta",
                "id",
                vec![
                    AttributeDef::scalar("id", ScalarKind::String),
                    AttributeDef::relation("next", Cardinality::OneToOne, "Gamma", "prev"),
                    AttributeDef::relation("prev", Cardinality::OneToOne, "Alpha", "next"),
                ],
            ),
            ClassDef::new(
                "Gamma",
                "id",
                vec![
                    AttributeDef::scalar("id", ScalarKind::String),
                    AttributeDef::relation("next", Cardinality::OneToOne, "Alpha", "prev"),
                    AttributeDef::relation("prev", Cardinality::OneToOne, "Beta", "next"),
                ],
            ),
        ])
        .unwrap(),
    );

    // the schema itself is one relationship cycle
    assert_eq!(
        registry.cyclic_classes(),
        vec![vec!["Alpha".to_string(), "Beta".to_string(), "Gamma".to_string()]]
    );

    let mut graph = ObjectGraph::new(Arc::clone(&registry));
    let a = graph.add_with_values("Alpha", &[("id", str_val("a"))]).unwrap();
    let b = graph.add_with_values("Beta", &[("id", str_val("b"))]).unwrap();
    let c = graph.add_with_values("Gamma", &[("id", str_val("c"))]).unwrap();
    graph.set_relationship_one(a, "next", Some(b)).unwrap();
    graph.set_relationship_one(b, "next", Some(c)).unwrap();
    graph.set_relationship_one(c, "next", Some(a)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cycle.json");
    Writer::new().run(&path, &graph).unwrap();
    let (reloaded, report) = Reader::new().run(&path, Arc::clone(&registry)).unwrap();
    assert!(report.is_ok(), "{}", report);

    let a2 = reloaded.find_by_primary_key("Alpha", &str_val("a")).unwrap();
    let b2 = reloaded.find_by_primary_key("Beta", &str_val("b")).unwrap();
    let c2 = reloaded.find_by_primary_key("Gamma", &str_val("c")).unwrap();
    assert_eq!(reloaded.related_one(a2, "next"), Some(b2));
    assert_eq!(reloaded.related_one(b2, "prev"), Some(a2));
    assert_eq!(reloaded.related_one(b2, "next"), Some(c2));
    assert_eq!(reloaded.related_one(c2, "prev"), Some(b2));
    assert_eq!(reloaded.related_one(c2, "next"), Some(a2));
    assert_eq!(reloaded.related_one(a2, "prev"), Some(c2));

    assert!(Differ::equal(&graph, &reloaded));
}

#[test]
fn test_dangling_reference_keeps_remainder_of_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.csv");
    fs::write(
        &path,
        "== Company\n\
         name,employees\n\
         acme,\"ada, ghost\"\n\
         \n\
         == Person\n\
         id,email,employer\n\
         ada,ada@acme.example,acme\n",
    )
    .unwrap();

    let (graph, report) = Reader::new().run(&path, registry()).unwrap();
    let unresolved: Vec<_> = report
        .issues
        .iter()
        .filter(|i| matches!(i, LoadIssue::UnresolvedReference { .. }))
        .collect();
    assert_eq!(unresolved.len(), 1);
    match unresolved[0] {
        LoadIssue::UnresolvedReference {
            missing_key,
            instance,
            target_class,
            ..
        } => {
            assert_eq!(missing_key, "ghost");
            assert_eq!(instance, "acme");
            assert_eq!(target_class, "Person");
        }
        _ => unreachable!(),
    }

    // the resolvable part of the graph is intact
    let company = graph.find_by_primary_key("Company", &str_val("acme")).unwrap();
    let ada = graph.find_by_primary_key("Person", &str_val("ada")).unwrap();
    assert_eq!(graph.related(company, "employees"), &[ada]);
}

#[test]
fn test_format_conversion_is_read_then_write() {
    let graph = sample_graph(&["ada", "bob"]);
    let dir = tempfile::tempdir().unwrap();

    let csv_path = dir.path().join("data.csv");
    let xlsx_path = dir.path().join("data.xlsx");
    let json_path = dir.path().join("data.json");

    Writer::new().run(&csv_path, &graph).unwrap();
    let report = tablegraph::codec::convert(&csv_path, &xlsx_path, registry()).unwrap();
    assert!(report.is_ok(), "{}", report);
    let report = tablegraph::codec::convert(&xlsx_path, &json_path, registry()).unwrap();
    assert!(report.is_ok(), "{}", report);

    let (final_graph, report) = Reader::new().run(&json_path, registry()).unwrap();
    assert!(report.is_ok(), "{}", report);
    assert!(Differ::equal(&graph, &final_graph));
}

#[test]
fn test_loaded_dataset_with_parse_errors_is_never_valid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.csv");
    fs::write(
        &path,
        "== Person\n\
         id,email,birthday\n\
         ada,ada@acme.example,not-a-date\n",
    )
    .unwrap();

    let (graph, report) = Reader::new().run(&path, registry()).unwrap();
    // the bad cell is a load error even though the graph itself validates
    assert!(!report.is_ok());
    assert!(report
        .issues
        .iter()
        .any(|i| matches!(i, LoadIssue::CellParse { column, .. } if column == "birthday")));
    assert!(Validator::run(&graph).is_none());
}
