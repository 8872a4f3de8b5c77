//! Table codec: grid-of-tables contract plus the format-agnostic
//! reader/writer core
//!
//! Every physical format (workbook, delimited directory, multi-block file,
//! tree document) is a bijection between bytes and a [`TableSet`]: a named
//! collection of 2-D cell grids. The reader and writer are written once
//! against the grid contract; backends never see schema logic.
//!
//! Loading is two-phase. The instantiate pass parses every scalar cell and
//! creates instances; relational cells are recorded as raw target-key text.
//! The link pass runs only after every grid has been instantiated, a hard
//! barrier, because forward references across tables are the norm rather
//! than an edge case. It resolves each recorded reference by primary-key
//! lookup across the whole load set.

pub mod delimited;
pub mod tree;
pub mod workbook;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use tracing::debug;

use crate::config::CodecConfig;
use crate::error::{EngineError, Result};
use crate::graph::{InstanceId, ObjectGraph};
use crate::normalize::sorted_instances;
use crate::registry::SchemaRegistry;
use crate::report::{LoadIssue, LoadReport};
use crate::schema::{AttributeDef, AttributeKind, Cardinality, ClassDef, TableLayout};
use crate::value::Value;

/// One named 2-D cell grid
///
/// The first row is the header (one attribute name per column). A second
/// row whose first cell starts with `#` is an optional help-text row. All
/// remaining rows are data. Classes with column layout store the transposed
/// form; the core transposes back before interpreting regions.
#[derive(Debug, Clone, PartialEq)]
pub struct CellGrid {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl CellGrid {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }
}

/// The portable intermediate representation shared by all backends
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSet {
    pub grids: Vec<CellGrid>,
}

impl TableSet {
    pub fn get(&self, name: &str) -> Option<&CellGrid> {
        self.grids.iter().find(|g| g.name == name)
    }

    pub fn push(&mut self, grid: CellGrid) {
        self.grids.push(grid);
    }
}

/// Physical encodings of the grid-of-tables representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-sheet workbook (.xlsx), one sheet per class
    Workbook,
    /// Directory of one comma-delimited file per class
    CsvDir,
    /// Directory of one tab-delimited file per class
    TsvDir,
    /// Single comma-delimited file holding one block per class
    MultiCsv,
    /// Single tab-delimited file holding one block per class
    MultiTsv,
    /// Structured hierarchical JSON document
    Tree,
}

impl Format {
    /// Pick a format from a path: `.xlsx`, `.json`, `.csv`, `.tsv` map to
    /// their encodings; a path with no extension is a delimited directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("xlsx") => Ok(Format::Workbook),
            Some("json") => Ok(Format::Tree),
            Some("csv") => Ok(Format::MultiCsv),
            Some("tsv") => Ok(Format::MultiTsv),
            Some(other) => Err(EngineError::UnsupportedFormat(other.to_string())),
            None => Ok(Format::CsvDir),
        }
    }
}

/// Transpose a ragged row matrix, padding short rows with empty cells
pub(super) fn transpose(rows: &[Vec<String>]) -> Vec<Vec<String>> {
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    (0..width)
        .map(|c| {
            rows.iter()
                .map(|r| r.get(c).cloned().unwrap_or_default())
                .collect()
        })
        .collect()
}

/// How one physical column maps onto the class's attributes
#[derive(Debug, Clone, Copy)]
enum Binding {
    Ignored,
    /// Index into the class's attribute list
    Attr(usize),
    /// Dotted column of an inline to-one target: relation attribute index
    /// plus attribute index within the inline class
    Inline { rel: usize, sub: usize },
}

/// A relational cell whose target keys resolve in the link pass
struct Deferred {
    source: InstanceId,
    class: String,
    attribute: String,
    target_class: String,
    to_many: bool,
    raw: String,
}

/// Reads any supported encoding into an object graph
#[derive(Default)]
pub struct Reader {
    config: CodecConfig,
}

impl Reader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Load a dataset, picking the format from the path
    pub fn run(
        &self,
        path: impl AsRef<Path>,
        registry: Arc<SchemaRegistry>,
    ) -> Result<(ObjectGraph, LoadReport)> {
        let path = path.as_ref();
        let format = Format::from_path(path)?;
        self.run_format(path, format, registry)
    }

    /// Load a dataset from an explicit format
    pub fn run_format(
        &self,
        path: impl AsRef<Path>,
        format: Format,
        registry: Arc<SchemaRegistry>,
    ) -> Result<(ObjectGraph, LoadReport)> {
        let path = path.as_ref();
        let tables = match format {
            Format::Workbook => workbook::decode(path)?,
            Format::CsvDir => delimited::decode_dir(path, b',')?,
            Format::TsvDir => delimited::decode_dir(path, b'\t')?,
            Format::MultiCsv => delimited::decode_blocks(path, b',', &self.config)?,
            Format::MultiTsv => delimited::decode_blocks(path, b'\t', &self.config)?,
            Format::Tree => tree::decode(path, &registry, &self.config)?,
        };
        self.read_tables(&tables, registry)
    }

    /// Format-agnostic core: build a graph from a grid-of-tables
    pub fn read_tables(
        &self,
        tables: &TableSet,
        registry: Arc<SchemaRegistry>,
    ) -> Result<(ObjectGraph, LoadReport)> {
        let mut graph = ObjectGraph::new(Arc::clone(&registry));
        let mut report = LoadReport::new();
        let mut deferred: Vec<Deferred> = Vec::new();
        // (class, canonical pk text) -> instance and the physical row it
        // first appeared on
        let mut by_key: HashMap<(String, String), (InstanceId, usize)> = HashMap::new();

        // instantiate pass
        for grid in &tables.grids {
            let Some(class) = registry.class_by_any_name(&grid.name) else {
                report.push(LoadIssue::UnknownTable {
                    name: grid.name.clone(),
                });
                continue;
            };
            self.instantiate_grid(
                grid,
                class,
                &registry,
                &mut graph,
                &mut report,
                &mut deferred,
                &mut by_key,
            )?;
        }
        debug!(
            instances = graph.len(),
            deferred = deferred.len(),
            "instantiate pass complete"
        );

        // link pass: every grid is instantiated, resolve across the whole set
        for d in deferred {
            self.link_deferred(&d, &registry, &mut graph, &mut report, &by_key)?;
        }
        debug!(issues = report.issues.len(), "link pass complete");

        Ok((graph, report))
    }

    #[allow(clippy::too_many_arguments)]
    fn instantiate_grid(
        &self,
        grid: &CellGrid,
        class: &ClassDef,
        registry: &SchemaRegistry,
        graph: &mut ObjectGraph,
        report: &mut LoadReport,
        deferred: &mut Vec<Deferred>,
        by_key: &mut HashMap<(String, String), (InstanceId, usize)>,
    ) -> Result<()> {
        let transposed;
        let rows: &[Vec<String>] = if class.layout == TableLayout::Column {
            transposed = transpose(&grid.rows);
            &transposed
        } else {
            &grid.rows
        };
        if rows.is_empty() {
            return Ok(());
        }

        let header = &rows[0];
        let data_start = if rows.len() > 1
            && rows[1]
                .first()
                .is_some_and(|c| c.trim_start().starts_with('#'))
        {
            2
        } else {
            1
        };

        let bindings = self.bind_columns(header, class, registry, report);

        // every required attribute must be covered by some column
        for (i, attr) in class.attributes.iter().enumerate() {
            if !attr.constraints.required {
                continue;
            }
            let covered = bindings.iter().any(|b| match b {
                Binding::Attr(j) => *j == i,
                // a required relation to an inline class is covered by its
                // dotted sub-columns
                Binding::Inline { rel, .. } => *rel == i,
                Binding::Ignored => false,
            });
            if !covered {
                report.push(LoadIssue::MissingRequiredColumn {
                    class: class.name.clone(),
                    attribute: attr.name.clone(),
                });
            }
        }

        for (ri, row) in rows[data_start..].iter().enumerate() {
            if row.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            let physical_row = data_start + ri + 1;
            self.instantiate_row(
                row,
                physical_row,
                &bindings,
                class,
                registry,
                graph,
                report,
                deferred,
                by_key,
            )?;
        }
        Ok(())
    }

    /// Match header cells to attributes: exact name, then verbose name,
    /// then dotted `relation.attribute` columns of inline targets. Unknown
    /// headers are warnings with a fuzzy closest-attribute suggestion.
    fn bind_columns(
        &self,
        header: &[String],
        class: &ClassDef,
        registry: &SchemaRegistry,
        report: &mut LoadReport,
    ) -> Vec<Binding> {
        let matcher = SkimMatcherV2::default();
        header
            .iter()
            .map(|cell| {
                let name = cell.trim();
                if name.is_empty() {
                    return Binding::Ignored;
                }
                if let Some(i) = class.attributes.iter().position(|a| {
                    a.name == name || a.verbose_name.as_deref() == Some(name)
                }) {
                    return Binding::Attr(i);
                }
                if let Some((rel_name, sub_name)) = name.split_once('.') {
                    for (i, attr) in class.attributes.iter().enumerate() {
                        let Some(rel) = attr.kind.as_relation() else {
                            continue;
                        };
                        if attr.name != rel_name {
                            continue;
                        }
                        let Some(target) = registry.class(&rel.target) else {
                            continue;
                        };
                        if target.layout != TableLayout::Inline {
                            continue;
                        }
                        if let Some(j) = target.attributes.iter().position(|a| {
                            !a.kind.is_relation()
                                && (a.name == sub_name
                                    || a.verbose_name.as_deref() == Some(sub_name))
                        }) {
                            return Binding::Inline { rel: i, sub: j };
                        }
                    }
                }
                let suggestion = class
                    .attributes
                    .iter()
                    .filter_map(|a| {
                        matcher
                            .fuzzy_match(&a.name, name)
                            .map(|score| (score, a.name.clone()))
                    })
                    .max_by_key(|(score, _)| *score)
                    .map(|(_, name)| name);
                report.push(LoadIssue::UnknownColumn {
                    class: class.name.clone(),
                    column: name.to_string(),
                    suggestion,
                });
                Binding::Ignored
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn instantiate_row(
        &self,
        row: &[String],
        physical_row: usize,
        bindings: &[Binding],
        class: &ClassDef,
        registry: &SchemaRegistry,
        graph: &mut ObjectGraph,
        report: &mut LoadReport,
        deferred: &mut Vec<Deferred>,
        by_key: &mut HashMap<(String, String), (InstanceId, usize)>,
    ) -> Result<()> {
        let id = graph.add_instance(&class.name)?;
        let mut row_deferred: Vec<Deferred> = Vec::new();
        // (relation attr index, inline attr index, cell text)
        let mut inline_cells: Vec<(usize, usize, String)> = Vec::new();

        for (ci, binding) in bindings.iter().enumerate() {
            let cell = row.get(ci).map(|c| c.trim()).unwrap_or("");
            match binding {
                Binding::Ignored => {}
                Binding::Inline { rel, sub } => {
                    if !cell.is_empty() {
                        inline_cells.push((*rel, *sub, cell.to_string()));
                    }
                }
                Binding::Attr(i) => {
                    let attr = &class.attributes[*i];
                    match &attr.kind {
                        AttributeKind::Scalar(kind) => {
                            if cell.is_empty() {
                                if let Some(default) = &attr.constraints.default {
                                    graph.set_value(id, &attr.name, default.clone())?;
                                }
                            } else {
                                match registry.parse_scalar(kind, cell) {
                                    Ok(value) => graph.set_value(id, &attr.name, value)?,
                                    Err(reason) => report.push(LoadIssue::CellParse {
                                        class: class.name.clone(),
                                        row: physical_row,
                                        column: attr.name.clone(),
                                        text: cell.to_string(),
                                        reason,
                                    }),
                                }
                            }
                        }
                        AttributeKind::List(kind) => {
                            if cell.is_empty() {
                                if let Some(default) = &attr.constraints.default {
                                    graph.set_value(id, &attr.name, default.clone())?;
                                }
                                continue;
                            }
                            let mut items = Vec::new();
                            let mut failed = false;
                            for part in cell.split(self.config.split_char()) {
                                let part = part.trim();
                                if part.is_empty() {
                                    continue;
                                }
                                match registry.parse_scalar(kind, part) {
                                    Ok(value) => items.push(value),
                                    Err(reason) => {
                                        failed = true;
                                        report.push(LoadIssue::CellParse {
                                            class: class.name.clone(),
                                            row: physical_row,
                                            column: attr.name.clone(),
                                            text: part.to_string(),
                                            reason,
                                        });
                                    }
                                }
                            }
                            if !failed {
                                graph.set_value(id, &attr.name, Value::List(items))?;
                            }
                        }
                        AttributeKind::Relation(rel) => {
                            if !cell.is_empty() {
                                row_deferred.push(Deferred {
                                    source: id,
                                    class: class.name.clone(),
                                    attribute: attr.name.clone(),
                                    target_class: rel.target.clone(),
                                    to_many: rel.cardinality.is_to_many(),
                                    raw: cell.to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }

        // duplicate primary keys keep the first instance and drop the row
        if let Some(key) = graph.primary_key_text(id) {
            let map_key = (class.name.clone(), key.clone());
            if let Some(&(_, first_row)) = by_key.get(&map_key) {
                report.push(LoadIssue::DuplicatePrimaryKey {
                    class: class.name.clone(),
                    key,
                    first_row,
                    second_row: physical_row,
                });
                graph.remove_instance(id)?;
                return Ok(());
            }
            by_key.insert(map_key, (id, physical_row));
        }

        deferred.extend(row_deferred);
        self.build_inline_targets(
            id,
            physical_row,
            inline_cells,
            class,
            registry,
            graph,
            report,
            by_key,
        )?;
        Ok(())
    }

    /// Reconstruct inline to-one targets from their dotted columns. Equal
    /// composite values collapse onto one shared instance; a key collision
    /// with different values is a duplicate-key error.
    #[allow(clippy::too_many_arguments)]
    fn build_inline_targets(
        &self,
        parent: InstanceId,
        physical_row: usize,
        inline_cells: Vec<(usize, usize, String)>,
        class: &ClassDef,
        registry: &SchemaRegistry,
        graph: &mut ObjectGraph,
        report: &mut LoadReport,
        by_key: &mut HashMap<(String, String), (InstanceId, usize)>,
    ) -> Result<()> {
        let mut rel_indices: Vec<usize> = inline_cells.iter().map(|(r, _, _)| *r).collect();
        rel_indices.sort_unstable();
        rel_indices.dedup();

        for rel_idx in rel_indices {
            let rel_attr = &class.attributes[rel_idx];
            let Some(rel) = rel_attr.kind.as_relation() else {
                continue;
            };
            let Some(target) = registry.class(&rel.target) else {
                continue;
            };

            let mut values: Vec<(String, Value)> = Vec::new();
            let mut failed = false;
            for (_, sub_idx, cell) in inline_cells.iter().filter(|(r, _, _)| *r == rel_idx) {
                let sub = &target.attributes[*sub_idx];
                match &sub.kind {
                    AttributeKind::Scalar(kind) => match registry.parse_scalar(kind, cell) {
                        Ok(value) => values.push((sub.name.clone(), value)),
                        Err(reason) => {
                            failed = true;
                            report.push(LoadIssue::CellParse {
                                class: target.name.clone(),
                                row: physical_row,
                                column: format!("{}.{}", rel_attr.name, sub.name),
                                text: cell.clone(),
                                reason,
                            });
                        }
                    },
                    AttributeKind::List(kind) => {
                        let mut items = Vec::new();
                        let mut list_failed = false;
                        for part in cell
                            .split(self.config.split_char())
                            .map(str::trim)
                            .filter(|p| !p.is_empty())
                        {
                            match registry.parse_scalar(kind, part) {
                                Ok(value) => items.push(value),
                                Err(reason) => {
                                    list_failed = true;
                                    report.push(LoadIssue::CellParse {
                                        class: target.name.clone(),
                                        row: physical_row,
                                        column: format!("{}.{}", rel_attr.name, sub.name),
                                        text: part.to_string(),
                                        reason,
                                    });
                                }
                            }
                        }
                        if list_failed {
                            failed = true;
                        } else {
                            values.push((sub.name.clone(), Value::List(items)));
                        }
                    }
                    // relational sub-columns are never bound
                    AttributeKind::Relation(_) => {}
                }
            }
            if failed || values.is_empty() {
                continue;
            }

            let key_text = values
                .iter()
                .find(|(name, _)| *name == target.primary_key)
                .map(|(_, v)| {
                    let attr = target.primary_key_attr();
                    match attr.map(|a| &a.kind) {
                        Some(AttributeKind::Scalar(kind)) => registry.format_scalar(kind, v),
                        _ => v.to_string(),
                    }
                });

            let existing = key_text
                .as_ref()
                .and_then(|k| by_key.get(&(target.name.clone(), k.clone())).copied());
            match existing {
                Some((other, first_row)) => {
                    let same = values.iter().all(|(name, value)| {
                        graph.value(other, name).is_some_and(|v| v.value_equal(value))
                    });
                    // equal composite values share one instance, but a
                    // one-to-one parent relation cannot share a target
                    let shareable = same
                        && !(rel.cardinality == Cardinality::OneToOne
                            && !graph.related(other, &rel.inverse).is_empty());
                    if shareable {
                        graph.set_relationship_one(parent, &rel_attr.name, Some(other))?;
                    } else if let Some(key) = key_text {
                        report.push(LoadIssue::DuplicatePrimaryKey {
                            class: target.name.clone(),
                            key,
                            first_row,
                            second_row: physical_row,
                        });
                    }
                }
                None => {
                    let inline_id = graph.add_instance(&target.name)?;
                    for (name, value) in &values {
                        graph.set_value(inline_id, name, value.clone())?;
                    }
                    if let Some(key) = key_text {
                        by_key.insert((target.name.clone(), key), (inline_id, physical_row));
                    }
                    graph.set_relationship_one(parent, &rel_attr.name, Some(inline_id))?;
                }
            }
        }
        Ok(())
    }

    fn link_deferred(
        &self,
        d: &Deferred,
        registry: &SchemaRegistry,
        graph: &mut ObjectGraph,
        report: &mut LoadReport,
        by_key: &HashMap<(String, String), (InstanceId, usize)>,
    ) -> Result<()> {
        let keys: Vec<String> = if d.to_many {
            d.raw
                .split(self.config.split_char())
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect()
        } else {
            vec![d.raw.trim().to_string()]
        };

        let mut targets = Vec::new();
        for key in keys {
            let canonical = canonical_key(registry, &d.target_class, &key);
            let found = by_key
                .get(&(d.target_class.clone(), canonical))
                .or_else(|| by_key.get(&(d.target_class.clone(), key.clone())))
                .map(|&(id, _)| id);
            match found {
                Some(target) => targets.push(target),
                None => {
                    let instance = graph
                        .primary_key_text(d.source)
                        .unwrap_or_else(|| "<unkeyed instance>".to_string());
                    report.push(LoadIssue::UnresolvedReference {
                        class: d.class.clone(),
                        instance,
                        attribute: d.attribute.clone(),
                        target_class: d.target_class.clone(),
                        missing_key: key,
                    });
                }
            }
        }
        if !targets.is_empty() {
            graph.set_relationship(d.source, &d.attribute, &targets)?;
        }
        Ok(())
    }
}

/// Canonicalize reference-key text through the target's primary-key kind,
/// so "03" finds an integer key stored as "3"
fn canonical_key(registry: &SchemaRegistry, class: &str, raw: &str) -> String {
    let Some(class_def) = registry.class(class) else {
        return raw.to_string();
    };
    let Some(attr) = class_def.primary_key_attr() else {
        return raw.to_string();
    };
    let AttributeKind::Scalar(kind) = &attr.kind else {
        return raw.to_string();
    };
    match registry.parse_scalar(kind, raw) {
        Ok(value) => registry.format_scalar(kind, &value),
        Err(_) => raw.to_string(),
    }
}

/// Writes an object graph into any supported encoding
#[derive(Default)]
pub struct Writer {
    config: CodecConfig,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Write a dataset, picking the format from the path
    pub fn run(&self, path: impl AsRef<Path>, graph: &ObjectGraph) -> Result<()> {
        let path = path.as_ref();
        let format = Format::from_path(path)?;
        self.run_format(path, format, graph)
    }

    /// Write a dataset in an explicit format
    pub fn run_format(
        &self,
        path: impl AsRef<Path>,
        format: Format,
        graph: &ObjectGraph,
    ) -> Result<()> {
        let path = path.as_ref();
        let tables = self.write_tables(graph);
        match format {
            Format::Workbook => workbook::encode(path, &tables),
            Format::CsvDir => delimited::encode_dir(path, &tables, b','),
            Format::TsvDir => delimited::encode_dir(path, &tables, b'\t'),
            Format::MultiCsv => delimited::encode_blocks(path, &tables, b',', &self.config),
            Format::MultiTsv => delimited::encode_blocks(path, &tables, b'\t', &self.config),
            Format::Tree => tree::encode(path, &tables, graph.registry(), &self.config),
        }
    }

    /// Format-agnostic core: emit one grid per non-inline class, rows in
    /// canonical instance order, collections in normalized order
    pub fn write_tables(&self, graph: &ObjectGraph) -> TableSet {
        let mut graph = graph.clone();
        crate::normalize::Normalizer::run(&mut graph);
        let registry = graph.registry_arc();

        let mut tables = TableSet::default();
        for class in registry.classes() {
            if class.layout == TableLayout::Inline {
                continue;
            }
            tables.push(self.write_class(&graph, &registry, class));
        }
        debug!(grids = tables.grids.len(), "tables written");
        tables
    }

    fn write_class(
        &self,
        graph: &ObjectGraph,
        registry: &SchemaRegistry,
        class: &ClassDef,
    ) -> CellGrid {
        // a column per attribute; inline to-one relations expand into
        // dotted sub-columns
        enum Col<'a> {
            Attr(&'a AttributeDef),
            Inline {
                rel: &'a AttributeDef,
                sub: &'a AttributeDef,
            },
        }

        let mut columns: Vec<Col<'_>> = Vec::new();
        for attr in &class.attributes {
            let inline_target = attr
                .kind
                .as_relation()
                .and_then(|rel| registry.class(&rel.target))
                .filter(|target| target.layout == TableLayout::Inline);
            match inline_target {
                Some(target) => {
                    // the inline class's back-link is implied by the parent
                    // relation; only its scalar attributes become columns
                    for sub in target.attributes.iter().filter(|s| !s.kind.is_relation()) {
                        columns.push(Col::Inline { rel: attr, sub });
                    }
                }
                None => columns.push(Col::Attr(attr)),
            }
        }

        let header: Vec<String> = columns
            .iter()
            .map(|col| match col {
                Col::Attr(attr) => attr.name.clone(),
                Col::Inline { rel, sub } => format!("{}.{}", rel.name, sub.name),
            })
            .collect();

        let mut rows: Vec<Vec<String>> = vec![header];

        let has_help = columns.iter().any(|col| match col {
            Col::Attr(attr) => attr.help.is_some(),
            Col::Inline { sub, .. } => sub.help.is_some(),
        });
        if self.config.write_help_row && has_help {
            let mut help_row: Vec<String> = columns
                .iter()
                .map(|col| match col {
                    Col::Attr(attr) => attr.help.clone().unwrap_or_default(),
                    Col::Inline { sub, .. } => sub.help.clone().unwrap_or_default(),
                })
                .collect();
            help_row[0] = format!("# {}", help_row[0]).trim_end().to_string();
            rows.push(help_row);
        }

        for id in sorted_instances(graph, &class.name) {
            let row: Vec<String> = columns
                .iter()
                .map(|col| match col {
                    Col::Attr(attr) => self.format_cell(graph, registry, id, attr),
                    Col::Inline { rel, sub } => graph
                        .related_one(id, &rel.name)
                        .map(|inline_id| self.format_cell(graph, registry, inline_id, sub))
                        .unwrap_or_default(),
                })
                .collect();
            rows.push(row);
        }

        let rows = if class.layout == TableLayout::Column {
            transpose(&rows)
        } else {
            rows
        };

        CellGrid {
            name: class.name.clone(),
            rows,
        }
    }

    fn format_cell(
        &self,
        graph: &ObjectGraph,
        registry: &SchemaRegistry,
        id: InstanceId,
        attr: &AttributeDef,
    ) -> String {
        match &attr.kind {
            AttributeKind::Scalar(kind) => graph
                .value(id, &attr.name)
                .map(|v| registry.format_scalar(kind, v))
                .unwrap_or_default(),
            AttributeKind::List(kind) => match graph.value(id, &attr.name) {
                Some(Value::List(items)) => items
                    .iter()
                    .map(|v| registry.format_scalar(kind, v))
                    .collect::<Vec<_>>()
                    .join(&self.config.list_delimiter),
                Some(other) => other.to_string(),
                None => String::new(),
            },
            AttributeKind::Relation(rel) => {
                let targets = graph.related(id, &attr.name);
                if rel.cardinality.is_to_many() {
                    targets
                        .iter()
                        .filter_map(|&t| graph.primary_key_text(t))
                        .collect::<Vec<_>>()
                        .join(&self.config.list_delimiter)
                } else {
                    targets
                        .first()
                        .and_then(|&t| graph.primary_key_text(t))
                        .unwrap_or_default()
                }
            }
        }
    }
}

/// Convert between two encodings: read, then write, no additional mutation
pub fn convert(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    registry: Arc<SchemaRegistry>,
) -> Result<LoadReport> {
    let reader = Reader::new();
    let (graph, report) = reader.run(source, registry)?;
    let writer = Writer::new();
    writer.run(destination, &graph)?;
    Ok(report)
}
