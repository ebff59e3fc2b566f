//! Migration artifact rendering

use serde_json::Value as Json;

use super::diff::diff;
use super::error::MigrationError;
use super::snapshot::SchemaDescriptor;
use crate::database::{Engine, SqlBuilder, StandardBuilder};

/// Renders the migration source for a schema change
pub trait MigrationWriter {
    /// File extension of the rendered artifact
    fn extension(&self) -> &str;

    /// Render the migration moving `old` to `new`
    fn render(
        &self,
        class_name: &str,
        new: &SchemaDescriptor,
        old: &SchemaDescriptor,
    ) -> Result<String, MigrationError>;
}

/// Writes plain SQL migrations with an `up` and a `down` section
#[derive(Debug, Clone)]
pub struct SqlMigrationWriter {
    quoting: StandardBuilder,
}

impl SqlMigrationWriter {
    pub fn new(engine: Engine) -> Self {
        SqlMigrationWriter {
            quoting: StandardBuilder::new(engine, ""),
        }
    }

    fn table(&self, name: &str) -> String {
        self.quoting.table_quote(name)
    }

    fn ident(&self, name: &str) -> String {
        self.quoting.column_quote(name)
    }

    fn column_def(&self, name: &str, attrs: &Json) -> String {
        let mut def = self.ident(name);
        match attrs {
            Json::String(kind) => {
                def.push(' ');
                def.push_str(kind);
            }
            Json::Object(map) => {
                if let Some(kind) = map.get("type").and_then(Json::as_str).filter(|k| !k.is_empty()) {
                    def.push(' ');
                    def.push_str(kind);
                }
                if map.get("pk").and_then(Json::as_i64).unwrap_or(0) > 0 {
                    def.push_str(" PRIMARY KEY");
                }
                if map.get("notnull").and_then(Json::as_bool).unwrap_or(false) {
                    def.push_str(" NOT NULL");
                }
                match map.get("default") {
                    None | Some(Json::Null) => {}
                    Some(Json::String(s)) => def.push_str(&format!(" DEFAULT {}", s)),
                    Some(other) => def.push_str(&format!(" DEFAULT {}", other)),
                }
            }
            _ => {}
        }
        def
    }

    fn create_index(&self, table: &str, name: &str, attrs: &Json) -> Option<String> {
        let columns: Vec<String> = attrs
            .get("columns")?
            .as_array()?
            .iter()
            .filter_map(Json::as_str)
            .map(|c| self.ident(c))
            .collect();
        if columns.is_empty() {
            return None;
        }
        let unique = attrs.get("unique").and_then(Json::as_bool).unwrap_or(false);
        Some(format!(
            "CREATE {}INDEX {} ON {} ({});",
            if unique { "UNIQUE " } else { "" },
            self.ident(name),
            self.table(table),
            columns.join(", ")
        ))
    }

    fn create_table(&self, name: &str, table: &Json) -> Vec<String> {
        let columns: Vec<String> = section(table, "columns")
            .map(|cols| cols.iter().map(|(c, attrs)| self.column_def(c, attrs)).collect())
            .unwrap_or_default();
        let mut statements = vec![format!(
            "CREATE TABLE {} (\n    {}\n);",
            self.table(name),
            columns.join(",\n    ")
        )];
        if let Some(indexes) = section(table, "indexes") {
            statements.extend(
                indexes
                    .iter()
                    .filter_map(|(index, attrs)| self.create_index(name, index, attrs)),
            );
        }
        statements
    }

    /// Statements that move a schema from `from` to `to`
    fn statements(&self, to: &SchemaDescriptor, from: &SchemaDescriptor) -> Vec<String> {
        let mut out = Vec::new();
        let added = diff(to, from);
        let removed = diff(from, to);

        for (name, change) in &removed {
            let Some(current) = to.get(name) else {
                out.push(format!("DROP TABLE {};", self.table(name)));
                continue;
            };
            if let Some(indexes) = section(change, "indexes") {
                for index in indexes.keys() {
                    let kept = section(current, "indexes").is_some_and(|i| i.contains_key(index));
                    if !kept {
                        out.push(format!("DROP INDEX {};", self.ident(index)));
                    }
                }
            }
            if let Some(columns) = section(change, "columns") {
                for column in columns.keys() {
                    let kept = section(current, "columns").is_some_and(|c| c.contains_key(column));
                    if !kept {
                        out.push(format!(
                            "ALTER TABLE {} DROP COLUMN {};",
                            self.table(name),
                            self.ident(column)
                        ));
                    }
                }
            }
        }

        for (name, change) in &added {
            let Some(previous) = from.get(name) else {
                // new tables come through the diff whole
                out.extend(self.create_table(name, change));
                continue;
            };
            let Some(current) = to.get(name) else {
                continue;
            };
            if let Some(columns) = section(change, "columns") {
                for column in columns.keys() {
                    let Some(attrs) = section(current, "columns").and_then(|c| c.get(column)) else {
                        continue;
                    };
                    let existed = section(previous, "columns").is_some_and(|c| c.contains_key(column));
                    if existed {
                        // no portable ALTER COLUMN
                        out.push(format!(
                            "-- change column {}.{} to: {}",
                            self.table(name),
                            self.ident(column),
                            self.column_def(column, attrs)
                        ));
                    } else {
                        out.push(format!(
                            "ALTER TABLE {} ADD COLUMN {};",
                            self.table(name),
                            self.column_def(column, attrs)
                        ));
                    }
                }
            }
            if let Some(indexes) = section(change, "indexes") {
                for index in indexes.keys() {
                    let Some(attrs) = section(current, "indexes").and_then(|i| i.get(index)) else {
                        continue;
                    };
                    if section(previous, "indexes").is_some_and(|i| i.contains_key(index)) {
                        out.push(format!("DROP INDEX {};", self.ident(index)));
                    }
                    out.extend(self.create_index(name, index, attrs));
                }
            }
        }
        out
    }
}

impl MigrationWriter for SqlMigrationWriter {
    fn extension(&self) -> &str {
        "sql"
    }

    fn render(
        &self,
        class_name: &str,
        new: &SchemaDescriptor,
        old: &SchemaDescriptor,
    ) -> Result<String, MigrationError> {
        let mut out = format!("-- Migration: {}\n", class_name);
        out.push_str("\n-- up\n");
        for statement in self.statements(new, old) {
            out.push_str(&statement);
            out.push('\n');
        }
        out.push_str("\n-- down\n");
        for statement in self.statements(old, new) {
            out.push_str(&statement);
            out.push('\n');
        }
        Ok(out)
    }
}

fn section<'a>(table: &'a Json, key: &str) -> Option<&'a serde_json::Map<String, Json>> {
    table.get(key).and_then(Json::as_object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(value: Json) -> SchemaDescriptor {
        match value {
            Json::Object(map) => map,
            other => panic!("not a mapping: {}", other),
        }
    }

    #[test]
    fn test_new_table() {
        let writer = SqlMigrationWriter::new(Engine::Sqlite);
        let new = descriptor(json!({"users": {"columns": {"id": "int"}}}));
        let out = writer
            .render("CreateUsers", &new, &SchemaDescriptor::new())
            .unwrap();

        assert_eq!(
            out,
            "-- Migration: CreateUsers\n\n-- up\nCREATE TABLE \"users\" (\n    \"id\" int\n);\n\n-- down\nDROP TABLE \"users\";\n"
        );
    }

    #[test]
    fn test_column_and_index_changes() {
        let writer = SqlMigrationWriter::new(Engine::Mysql);
        let old = descriptor(json!({
            "users": {
                "columns": {"id": {"type": "INTEGER", "pk": 1}, "nick": {"type": "TEXT"}},
                "indexes": {}
            }
        }));
        let new = descriptor(json!({
            "users": {
                "columns": {
                    "id": {"type": "INTEGER", "pk": 1},
                    "email": {"type": "TEXT", "notnull": true, "default": "''"}
                },
                "indexes": {"users_email": {"columns": ["email"], "unique": true}}
            }
        }));

        let up = writer.statements(&new, &old);
        assert_eq!(
            up,
            vec![
                "ALTER TABLE `users` DROP COLUMN `nick`;".to_string(),
                "ALTER TABLE `users` ADD COLUMN `email` TEXT NOT NULL DEFAULT '';".to_string(),
                "CREATE UNIQUE INDEX `users_email` ON `users` (`email`);".to_string(),
            ]
        );

        let down = writer.statements(&old, &new);
        assert_eq!(
            down,
            vec![
                "DROP INDEX `users_email`;".to_string(),
                "ALTER TABLE `users` DROP COLUMN `email`;".to_string(),
                "ALTER TABLE `users` ADD COLUMN `nick` TEXT;".to_string(),
            ]
        );
    }

    #[test]
    fn test_changed_column_is_noted() {
        let writer = SqlMigrationWriter::new(Engine::Sqlite);
        let old = descriptor(json!({"t": {"columns": {"v": "int"}}}));
        let new = descriptor(json!({"t": {"columns": {"v": "bigint"}}}));

        assert_eq!(
            writer.statements(&new, &old),
            vec!["-- change column \"t\".\"v\" to: \"v\" bigint".to_string()]
        );
    }
}
