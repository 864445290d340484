//! Rendering blueprints as a migration document.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::warn;

use super::{DumpOptions, DumpOrder};
use crate::core::blueprint::Blueprint;
use crate::core::column::{Column, ColumnType};
use crate::error::Result;
use crate::migrator::document::{MigrationDocument, SchemaStep, TableSpec};

const HEADER: &str = "# Generated by schema-migrate. Edit before committing.\n";

/// Render one document: `up` creates every table with referenced tables
/// first, `down` drops them in reverse.
pub fn render_document(blueprints: &[Blueprint], options: &DumpOptions) -> Result<String> {
    let order = creation_order(blueprints);

    let mut document = MigrationDocument::default();
    for &i in &order {
        let blueprint = &blueprints[i];
        let mut spec = TableSpec::from_blueprint(blueprint);
        if options.column_order == DumpOrder::Priority {
            sort_columns(&mut spec.columns, blueprint);
        }
        document.up.push(SchemaStep::Create(spec));
    }
    document.down = order
        .iter()
        .rev()
        .map(|&i| SchemaStep::Drop(blueprints[i].table().to_string()))
        .collect();

    Ok(format!("{}{}", HEADER, document.to_yaml()?))
}

/// Tables referenced by a blueprint's foreign keys and foreign-key roles.
fn referenced_tables(blueprint: &Blueprint) -> impl Iterator<Item = &str> {
    blueprint
        .foreign_keys()
        .map(|fk| fk.on.as_str())
        .chain(
            blueprint
                .columns()
                .iter()
                .filter_map(|c| c.foreign.as_ref().map(|role| role.on.as_str())),
        )
}

/// Positions of `blueprints` in creation order.
///
/// Kahn's algorithm, always taking the earliest ready table in catalog
/// order. Self-references and references outside the dump are ignored.
/// Tables caught in a cycle keep catalog order after everything else.
pub fn creation_order(blueprints: &[Blueprint]) -> Vec<usize> {
    let positions: HashMap<&str, usize> = blueprints
        .iter()
        .enumerate()
        .map(|(i, bp)| (bp.table(), i))
        .collect();
    let dependencies: Vec<BTreeSet<usize>> = blueprints
        .iter()
        .enumerate()
        .map(|(i, bp)| {
            referenced_tables(bp)
                .filter_map(|table| positions.get(table).copied())
                .filter(|&j| j != i)
                .collect()
        })
        .collect();

    let mut placed = vec![false; blueprints.len()];
    let mut order = Vec::with_capacity(blueprints.len());
    while order.len() < blueprints.len() {
        let ready = (0..blueprints.len())
            .find(|&i| !placed[i] && dependencies[i].iter().all(|&j| placed[j]));
        match ready {
            Some(i) => {
                placed[i] = true;
                order.push(i);
            }
            None => {
                let rest: Vec<usize> = (0..blueprints.len()).filter(|&i| !placed[i]).collect();
                let names: Vec<&str> = rest.iter().map(|&i| blueprints[i].table()).collect();
                warn!(
                    "Foreign-key cycle between {}; emitting in catalog order",
                    names.join(", ")
                );
                order.extend(rest);
            }
        }
    }
    order
}

/// Rank used for the dumped column order.
fn priority(column: &Column, foreign_columns: &HashSet<&str>) -> u8 {
    if column.auto_increment {
        0
    } else if column.foreign.is_some() || foreign_columns.contains(column.name.as_str()) {
        1
    } else if column.kind.is_integer() {
        2
    } else if column.kind.is_string() {
        3
    } else if matches!(column.kind, ColumnType::Timestamp | ColumnType::DateTime) {
        4
    } else {
        5
    }
}

/// Stable sort by [`priority`]; ties keep column order.
fn sort_columns(columns: &mut [Column], blueprint: &Blueprint) {
    let foreign_columns: HashSet<&str> = blueprint
        .foreign_keys()
        .flat_map(|fk| fk.columns.iter().map(String::as_str))
        .collect();
    columns.sort_by_key(|column| priority(column, &foreign_columns));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constraint::{ForeignAction, ForeignKey};

    fn make_test_table(name: &str, references: &[&str]) -> Blueprint {
        let mut bp = Blueprint::new(name);
        bp.create();
        bp.increments("id");
        for table in references {
            bp.integer(&format!("{}_id", table)).references(*table, "id");
        }
        bp
    }

    fn tables(blueprints: &[Blueprint], order: &[usize]) -> Vec<String> {
        order.iter().map(|&i| blueprints[i].table().to_string()).collect()
    }

    #[test]
    fn test_referenced_tables_come_first() {
        let blueprints = vec![
            make_test_table("comments", &["posts", "users"]),
            make_test_table("posts", &["users"]),
            make_test_table("tags", &[]),
            make_test_table("users", &[]),
        ];
        let order = creation_order(&blueprints);
        assert_eq!(tables(&blueprints, &order), ["tags", "users", "posts", "comments"]);
    }

    #[test]
    fn test_self_reference_and_cycle() {
        let mut a = make_test_table("a", &["b"]);
        a.integer("parent_id").references("a", "id");
        let blueprints = vec![a, make_test_table("b", &["a"]), make_test_table("c", &["external"])];

        let order = creation_order(&blueprints);
        assert_eq!(tables(&blueprints, &order), ["c", "a", "b"]);
    }

    #[test]
    fn test_priority_column_order() {
        let mut bp = Blueprint::new("posts");
        bp.create();
        bp.string("title", 200);
        bp.timestamp("created_at").nullable();
        bp.text("body");
        bp.integer("votes");
        bp.integer("author_id").references("users", "id");
        bp.increments("id");
        bp.integer("team_id");
        bp.integer("team_slot");
        bp.char("code", 4);
        bp.foreign(ForeignKey::new(
            vec!["team_id".into(), "team_slot".into()],
            "slots",
            vec!["team_id".into(), "slot".into()],
        ));

        let mut spec = TableSpec::from_blueprint(&bp);
        sort_columns(&mut spec.columns, &bp);
        let names: Vec<_> = spec.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            ["id", "author_id", "team_id", "team_slot", "votes", "title", "code", "created_at", "body"]
        );
    }

    #[test]
    fn test_document_drops_in_reverse() {
        let blueprints = vec![make_test_table("posts", &["users"]), make_test_table("users", &[])];
        let yaml = render_document(&blueprints, &DumpOptions::default()).unwrap();

        assert!(yaml.starts_with("# Generated by schema-migrate"));
        let document = MigrationDocument::from_yaml(&yaml).unwrap();
        let created: Vec<_> = document
            .up
            .iter()
            .map(|step| match step {
                SchemaStep::Create(spec) => spec.name.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(created, ["users", "posts"]);
        assert_eq!(
            document.down,
            [SchemaStep::Drop("posts".into()), SchemaStep::Drop("users".into())]
        );
    }

    #[test]
    fn test_rendered_document_rebuilds_the_blueprint() {
        let mut bp = Blueprint::new("users");
        bp.create();
        bp.string("username", 128);
        bp.increments("id");
        bp.integer("team_id")
            .unsigned()
            .references("teams", "id")
            .on_delete(ForeignAction::Cascade);
        bp.decimal("balance", 8, 2).default(0.5);
        bp.enum_column("role", &["admin", "member"]).default("member");
        bp.timestamp("seen_at").nullable().use_current();
        bp.unique(&["username"]);

        let options = DumpOptions {
            column_order: DumpOrder::Catalog,
            ..Default::default()
        };
        let yaml = render_document(std::slice::from_ref(&bp), &options).unwrap();
        assert!(yaml.contains("type: increments"));
        assert!(yaml.contains("length: 128"));

        let document = MigrationDocument::from_yaml(&yaml).unwrap();
        let SchemaStep::Create(spec) = &document.up[0] else {
            panic!("expected create step");
        };
        let mut rebuilt = Blueprint::new(spec.name.as_str());
        rebuilt.create();
        spec.apply(&mut rebuilt);
        assert_eq!(rebuilt, bp);
    }
}
