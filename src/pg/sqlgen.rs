use crate::diff::{
    ColumnChange, ColumnDef, CommentTarget, DomainChange, EnumValuePosition, MigrationOp,
    ObjectKind, SequenceChanges, SerialValue,
};
use crate::model::{
    parse_qualified_name, Cell, Constraint, Function, Index, Sequence, Trigger, TriggerEvent,
    TriggerLevel, TriggerTiming, TypeDef, TypeKind, Volatility,
};
use crate::render::Renderer;
use crate::util::normalize_type;

const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false", "fetch",
    "for", "foreign", "from", "grant", "group", "having", "in", "initially", "intersect", "into",
    "lateral", "leading", "limit", "localtime", "localtimestamp", "not", "null", "offset", "on",
    "only", "or", "order", "placing", "primary", "references", "returning", "select",
    "session_user", "some", "symmetric", "table", "then", "to", "trailing", "true", "union",
    "unique", "user", "using", "variadic", "when", "where", "window", "with",
];

/// PostgreSQL text for planned operations.
#[derive(Debug, Clone, Default)]
pub struct PostgresRenderer {
    /// Quote every identifier, not only the ones that need it.
    pub quote_all_names: bool,
}

impl PostgresRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote_all_names(mut self, quote_all_names: bool) -> Self {
        self.quote_all_names = quote_all_names;
        self
    }

    fn needs_quoting(ident: &str) -> bool {
        let mut chars = ident.chars();
        let Some(first) = chars.next() else {
            return true;
        };
        if !(first.is_ascii_lowercase() || first == '_') {
            return true;
        }
        if !ident
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
        {
            return true;
        }
        RESERVED_WORDS.binary_search(&ident).is_ok()
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn role_list(&self, roles: &[String]) -> String {
        roles
            .iter()
            .map(|r| {
                if r.eq_ignore_ascii_case("public") {
                    "PUBLIC".to_string()
                } else {
                    self.quote_ident(r)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Index dimensions may be expressions; only bare column names are quoted.
    fn dimension(&self, dimension: &str) -> String {
        let trimmed = dimension.trim();
        if !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.quote_ident(trimmed)
        } else {
            trimmed.to_string()
        }
    }

    fn format_column(&self, column: &ColumnDef) -> String {
        let mut parts = vec![self.quote_ident(&column.name), column.data_type.clone()];
        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(ref default) = column.default {
            parts.push(format!("DEFAULT {default}"));
        }
        parts.join(" ")
    }

    fn generate_create_table(
        &self,
        table: &str,
        columns: &[ColumnDef],
        inherits: Option<&str>,
    ) -> String {
        let column_defs: Vec<String> = columns.iter().map(|c| self.format_column(c)).collect();
        let mut sql = if column_defs.is_empty() {
            format!("CREATE TABLE {} ()", self.quote_qualified_name(table))
        } else {
            format!(
                "CREATE TABLE {} (\n    {}\n)",
                self.quote_qualified_name(table),
                column_defs.join(",\n    ")
            )
        };
        if let Some(parent) = inherits {
            sql.push_str(&format!(" INHERITS ({})", self.quote_qualified_name(parent)));
        }
        sql.push(';');
        sql
    }

    fn generate_create_type(&self, schema: &str, type_def: &TypeDef) -> String {
        let name = self.quote_qualified(schema, &type_def.name);
        match type_def.kind {
            TypeKind::Enum { ref values } => format!(
                "CREATE TYPE {} AS ENUM ({});",
                name,
                values
                    .iter()
                    .map(|v| format!("'{}'", escape_string(v)))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TypeKind::Composite { ref fields } => format!(
                "CREATE TYPE {} AS ({});",
                name,
                fields
                    .iter()
                    .map(|f| format!("{} {}", self.quote_ident(&f.name), f.data_type))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TypeKind::Domain {
                ref base_type,
                ref default,
                nullable,
                ref checks,
            } => {
                let mut sql = format!("CREATE DOMAIN {name} AS {base_type}");
                if let Some(default) = default {
                    sql.push_str(&format!(" DEFAULT {default}"));
                }
                if !nullable {
                    sql.push_str(" NOT NULL");
                }
                for check in checks {
                    sql.push_str(&format!(
                        " CONSTRAINT {} CHECK ({})",
                        self.quote_ident(&check.name),
                        check.definition
                    ));
                }
                sql.push(';');
                sql
            }
        }
    }

    fn generate_alter_domain(&self, name: &str, change: &DomainChange) -> String {
        let action = match change {
            DomainChange::SetDefault(default) => format!("SET DEFAULT {default}"),
            DomainChange::DropDefault => "DROP DEFAULT".to_string(),
            DomainChange::SetNotNull => "SET NOT NULL".to_string(),
            DomainChange::DropNotNull => "DROP NOT NULL".to_string(),
            DomainChange::AddCheck(check) => format!(
                "ADD CONSTRAINT {} CHECK ({})",
                self.quote_ident(&check.name),
                check.definition
            ),
            DomainChange::DropCheck(check) => {
                format!("DROP CONSTRAINT {}", self.quote_ident(check))
            }
        };
        format!("ALTER DOMAIN {} {};", self.quote_qualified_name(name), action)
    }

    fn generate_create_sequence(&self, schema: &str, seq: &Sequence) -> String {
        let mut parts = vec![
            "CREATE SEQUENCE".to_string(),
            self.quote_qualified(schema, &seq.name),
        ];
        if let Some(start) = seq.start {
            parts.push(format!("START WITH {start}"));
        }
        if let Some(increment) = seq.increment {
            parts.push(format!("INCREMENT BY {increment}"));
        }
        if let Some(min_value) = seq.min_value {
            parts.push(format!("MINVALUE {min_value}"));
        }
        if let Some(max_value) = seq.max_value {
            parts.push(format!("MAXVALUE {max_value}"));
        }
        if seq.cycle {
            parts.push("CYCLE".to_string());
        }
        if let Some(cache) = seq.cache {
            parts.push(format!("CACHE {cache}"));
        }
        format!("{};", parts.join(" "))
    }

    fn generate_alter_sequence(&self, name: &str, changes: &SequenceChanges) -> String {
        let (schema, _) = parse_qualified_name(name);
        let mut parts = vec![
            "ALTER SEQUENCE".to_string(),
            self.quote_qualified_name(name),
        ];
        if let Some(start) = changes.start {
            parts.push(format!("START WITH {start}"));
        }
        if let Some(increment) = changes.increment {
            parts.push(format!("INCREMENT BY {increment}"));
        }
        if let Some(ref min_value) = changes.min_value {
            match min_value {
                Some(val) => parts.push(format!("MINVALUE {val}")),
                None => parts.push("NO MINVALUE".to_string()),
            }
        }
        if let Some(ref max_value) = changes.max_value {
            match max_value {
                Some(val) => parts.push(format!("MAXVALUE {val}")),
                None => parts.push("NO MAXVALUE".to_string()),
            }
        }
        if let Some(cache) = changes.cache {
            parts.push(format!("CACHE {cache}"));
        }
        if let Some(cycle) = changes.cycle {
            parts.push(if cycle { "CYCLE" } else { "NO CYCLE" }.to_string());
        }
        if let Some(ref owned_by) = changes.owned_by {
            match owned_by {
                Some(owner) => {
                    let (table, column) = owner.split_once('.').unwrap_or((owner.as_str(), ""));
                    parts.push(format!(
                        "OWNED BY {}.{}",
                        self.quote_qualified(&schema, table),
                        self.quote_ident(column)
                    ));
                }
                None => parts.push("OWNED BY NONE".to_string()),
            }
        }
        format!("{};", parts.join(" "))
    }

    fn generate_set_serial_value(&self, table: &str, column: &str, value: &SerialValue) -> String {
        let sequence = format!(
            "pg_get_serial_sequence('{}', '{}')",
            escape_string(&self.quote_qualified_name(table)),
            escape_string(column)
        );
        match value {
            SerialValue::Start(start) => format!("SELECT setval({sequence}, {start}, false);"),
            SerialValue::AfterMax => format!(
                "SELECT setval({sequence}, COALESCE((SELECT MAX({}) FROM {}), 0) + 1, false);",
                self.quote_ident(column),
                self.quote_qualified_name(table)
            ),
        }
    }

    fn generate_function_ddl(&self, schema: &str, func: &Function, replace: bool) -> String {
        let create_stmt = if replace {
            "CREATE OR REPLACE FUNCTION"
        } else {
            "CREATE FUNCTION"
        };
        let args = func
            .arguments
            .iter()
            .map(|arg| match arg.name {
                Some(ref name) => format!("{} {}", self.quote_ident(name), arg.data_type),
                None => arg.data_type.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "{} {}({}) RETURNS {} LANGUAGE {}",
            create_stmt,
            self.quote_qualified(schema, &func.name),
            args,
            func.returns,
            func.language
        );
        if let Some(volatility) = func.volatility {
            sql.push_str(match volatility {
                Volatility::Immutable => " IMMUTABLE",
                Volatility::Stable => " STABLE",
                Volatility::Volatile => " VOLATILE",
            });
        }
        if func.security_definer {
            sql.push_str(" SECURITY DEFINER");
        }
        sql.push_str(&format!(" AS {};", dollar_quote(&func.definition)));
        sql
    }

    fn generate_create_trigger(&self, schema: &str, trigger: &Trigger) -> String {
        let timing = match trigger.timing {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => "INSTEAD OF",
        };
        let events: Vec<&str> = trigger
            .events
            .iter()
            .map(|e| match e {
                TriggerEvent::Insert => "INSERT",
                TriggerEvent::Update => "UPDATE",
                TriggerEvent::Delete => "DELETE",
                TriggerEvent::Truncate => "TRUNCATE",
            })
            .collect();

        let mut sql = format!(
            "CREATE TRIGGER {} {} {} ON {}",
            self.quote_ident(&trigger.name),
            timing,
            events.join(" OR "),
            self.quote_qualified(schema, &trigger.table)
        );
        sql.push_str(match trigger.for_each {
            TriggerLevel::Row => " FOR EACH ROW",
            TriggerLevel::Statement => " FOR EACH STATEMENT",
        });
        if let Some(ref when_clause) = trigger.when {
            sql.push_str(&format!(" WHEN ({when_clause})"));
        }
        let function = trigger.function.trim();
        if function.ends_with(')') {
            sql.push_str(&format!(" EXECUTE FUNCTION {function};"));
        } else {
            sql.push_str(&format!(" EXECUTE FUNCTION {function}();"));
        }
        sql
    }

    fn generate_create_index(&self, table: &str, index: &Index) -> String {
        let mut sql = format!(
            "CREATE {}INDEX {} ON {}",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_ident(&index.name),
            self.quote_qualified_name(table)
        );
        if let Some(ref method) = index.method {
            sql.push_str(&format!(" USING {method}"));
        }
        sql.push_str(&format!(
            " ({})",
            index
                .dimensions
                .iter()
                .map(|d| self.dimension(d))
                .collect::<Vec<_>>()
                .join(", ")
        ));
        if let Some(ref predicate) = index.predicate {
            sql.push_str(&format!(" WHERE {predicate}"));
        }
        sql.push(';');
        sql
    }

    fn generate_add_constraint(&self, constraint: &Constraint) -> String {
        let mut sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {} {}",
            self.quote_qualified(&constraint.schema, &constraint.table),
            self.quote_ident(&constraint.name),
            constraint.kind.as_sql(),
            constraint.definition
        );
        if let Some(action) = constraint.on_delete {
            sql.push_str(&format!(" ON DELETE {}", action.as_sql()));
        }
        if let Some(action) = constraint.on_update {
            sql.push_str(&format!(" ON UPDATE {}", action.as_sql()));
        }
        sql.push(';');
        sql
    }

    fn generate_alter_column(&self, table: &str, column: &str, change: &ColumnChange) -> String {
        let action = match change {
            ColumnChange::Type { data_type, using } => match using {
                Some(expr) => format!("TYPE {data_type} USING {expr}"),
                None => format!("TYPE {data_type}"),
            },
            ColumnChange::SetDefault(default) => format!("SET DEFAULT {default}"),
            ColumnChange::DropDefault => "DROP DEFAULT".to_string(),
            ColumnChange::SetNotNull => "SET NOT NULL".to_string(),
            ColumnChange::DropNotNull => "DROP NOT NULL".to_string(),
        };
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {};",
            self.quote_qualified_name(table),
            self.quote_ident(column),
            action
        )
    }

    fn object_clause(&self, kind: ObjectKind, name: &str, args: Option<&str>) -> String {
        match kind {
            ObjectKind::Schema => format!("SCHEMA {}", self.quote_ident(name)),
            ObjectKind::Table => format!("TABLE {}", self.quote_qualified_name(name)),
            ObjectKind::View => format!("TABLE {}", self.quote_qualified_name(name)),
            ObjectKind::Sequence => format!("SEQUENCE {}", self.quote_qualified_name(name)),
            ObjectKind::Type => format!("TYPE {}", self.quote_qualified_name(name)),
            ObjectKind::Function => format!(
                "FUNCTION {}({})",
                self.quote_qualified_name(name),
                args.unwrap_or_default()
            ),
        }
    }

    fn owner_clause(&self, kind: ObjectKind, name: &str, args: Option<&str>) -> String {
        match kind {
            ObjectKind::View => format!("VIEW {}", self.quote_qualified_name(name)),
            _ => self.object_clause(kind, name, args),
        }
    }

    fn generate_comment(&self, target: &CommentTarget, text: Option<&str>) -> String {
        let target = match target {
            CommentTarget::Schema(name) => format!("SCHEMA {}", self.quote_ident(name)),
            CommentTarget::Table(name) => format!("TABLE {}", self.quote_qualified_name(name)),
            CommentTarget::View(name) => format!("VIEW {}", self.quote_qualified_name(name)),
            CommentTarget::Column { table, column } => format!(
                "COLUMN {}.{}",
                self.quote_qualified_name(table),
                self.quote_ident(column)
            ),
        };
        match text {
            Some(text) => format!("COMMENT ON {target} IS '{}';", escape_string(text)),
            None => format!("COMMENT ON {target} IS NULL;"),
        }
    }

    fn condition(&self, key: &[(String, String)]) -> String {
        key.iter()
            .map(|(column, value)| {
                if value == "NULL" {
                    format!("{} IS NULL", self.quote_ident(column))
                } else {
                    format!("{} = {}", self.quote_ident(column), value)
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

impl Renderer for PostgresRenderer {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_ident(&self, ident: &str) -> String {
        if self.quote_all_names || Self::needs_quoting(ident) {
            format!("\"{}\"", ident.replace('"', "\"\""))
        } else {
            ident.to_string()
        }
    }

    fn literal(&self, data_type: &str, cell: &Cell) -> String {
        if cell.null {
            return "NULL".to_string();
        }
        if cell.empty {
            return "''".to_string();
        }
        let Some(ref value) = cell.value else {
            return "NULL".to_string();
        };
        if cell.sql {
            return value.clone();
        }

        let normalized = normalize_type(data_type);
        let base = normalized
            .split(['(', '['])
            .next()
            .unwrap_or_default()
            .trim();
        let is_array = normalized.contains('[');
        match base {
            "boolean" if !is_array => match value.to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "on" | "1" => "TRUE".to_string(),
                "false" | "f" | "no" | "n" | "off" | "0" => "FALSE".to_string(),
                _ => format!("'{}'", escape_string(value)),
            },
            "integer" | "bigint" | "smallint" | "serial" | "bigserial" | "smallserial"
            | "numeric" | "real" | "double precision"
                if !is_array && is_numeric_literal(value) =>
            {
                value.trim().to_string()
            }
            _ => format!("'{}'", escape_string(value)),
        }
    }

    fn render(&self, op: &MigrationOp) -> Vec<String> {
        match op {
            MigrationOp::Comment(text) => vec![text
                .lines()
                .map(|line| format!("-- {line}"))
                .collect::<Vec<_>>()
                .join("\n")],

            MigrationOp::CustomSql(text) => vec![text.trim().to_string()],

            MigrationOp::CreateSchema(name) => {
                vec![format!(
                    "CREATE SCHEMA IF NOT EXISTS {};",
                    self.quote_ident(name)
                )]
            }

            MigrationOp::DropSchema(name) => {
                vec![format!("DROP SCHEMA {} CASCADE;", self.quote_ident(name))]
            }

            MigrationOp::CreateType { schema, type_def } => {
                vec![self.generate_create_type(schema, type_def)]
            }

            MigrationOp::DropType { name, domain } => vec![format!(
                "DROP {} {};",
                if *domain { "DOMAIN" } else { "TYPE" },
                self.quote_qualified_name(name)
            )],

            MigrationOp::AddEnumValue {
                type_name,
                value,
                position,
            } => {
                let mut sql = format!(
                    "ALTER TYPE {} ADD VALUE '{}'",
                    self.quote_qualified_name(type_name),
                    escape_string(value)
                );
                match position {
                    Some(EnumValuePosition::Before(v)) => {
                        sql.push_str(&format!(" BEFORE '{}'", escape_string(v)))
                    }
                    Some(EnumValuePosition::After(v)) => {
                        sql.push_str(&format!(" AFTER '{}'", escape_string(v)))
                    }
                    None => {}
                }
                sql.push(';');
                vec![sql]
            }

            MigrationOp::AlterDomain { name, change } => {
                vec![self.generate_alter_domain(name, change)]
            }

            MigrationOp::CreateSequence { schema, sequence } => {
                vec![self.generate_create_sequence(schema, sequence)]
            }

            MigrationOp::AlterSequence { name, changes } => {
                vec![self.generate_alter_sequence(name, changes)]
            }

            MigrationOp::DropSequence(name) => {
                vec![format!(
                    "DROP SEQUENCE IF EXISTS {};",
                    self.quote_qualified_name(name)
                )]
            }

            MigrationOp::SetSerialValue {
                table,
                column,
                value,
            } => vec![self.generate_set_serial_value(table, column, value)],

            MigrationOp::CreateFunction {
                schema,
                function,
                replace,
            } => vec![self.generate_function_ddl(schema, function, *replace)],

            MigrationOp::DropFunction { name, args } => vec![format!(
                "DROP FUNCTION {}({});",
                self.quote_qualified_name(name),
                args
            )],

            MigrationOp::CreateTable {
                table,
                columns,
                inherits,
            } => vec![self.generate_create_table(table, columns, inherits.as_deref())],

            MigrationOp::DropTable(name) => {
                vec![format!("DROP TABLE {};", self.quote_qualified_name(name))]
            }

            MigrationOp::SetTableSchema { table, schema } => vec![format!(
                "ALTER TABLE {} SET SCHEMA {};",
                self.quote_qualified_name(table),
                self.quote_ident(schema)
            )],

            MigrationOp::RenameTable { table, new_name } => vec![format!(
                "ALTER TABLE {} RENAME TO {};",
                self.quote_qualified_name(table),
                self.quote_ident(new_name)
            )],

            MigrationOp::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {};",
                self.quote_qualified_name(table),
                self.format_column(column)
            )],

            MigrationOp::DropColumn { table, column } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {};",
                self.quote_qualified_name(table),
                self.quote_ident(column)
            )],

            MigrationOp::RenameColumn { table, from, to } => vec![format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {};",
                self.quote_qualified_name(table),
                self.quote_ident(from),
                self.quote_ident(to)
            )],

            MigrationOp::AlterColumn {
                table,
                column,
                change,
            } => vec![self.generate_alter_column(table, column, change)],

            MigrationOp::BackfillColumn {
                table,
                column,
                value,
            } => {
                let column = self.quote_ident(column);
                vec![format!(
                    "UPDATE {} SET {} = {} WHERE {} IS NULL;",
                    self.quote_qualified_name(table),
                    column,
                    value.as_deref().unwrap_or("DEFAULT"),
                    column
                )]
            }

            MigrationOp::AddConstraint(constraint) => {
                vec![self.generate_add_constraint(constraint)]
            }

            MigrationOp::DropConstraint { table, name } => vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {};",
                self.quote_qualified_name(table),
                self.quote_ident(name)
            )],

            MigrationOp::CreateIndex { table, index } => {
                vec![self.generate_create_index(table, index)]
            }

            MigrationOp::DropIndex { schema, name } => vec![format!(
                "DROP INDEX {};",
                self.quote_qualified(schema, name)
            )],

            MigrationOp::SetCluster { table, index } => match index {
                Some(index) => vec![format!(
                    "ALTER TABLE {} CLUSTER ON {};",
                    self.quote_qualified_name(table),
                    self.quote_ident(index)
                )],
                None => vec![format!(
                    "ALTER TABLE {} SET WITHOUT CLUSTER;",
                    self.quote_qualified_name(table)
                )],
            },

            MigrationOp::CreateTrigger { schema, trigger } => {
                vec![self.generate_create_trigger(schema, trigger)]
            }

            MigrationOp::DropTrigger { table, name } => vec![format!(
                "DROP TRIGGER {} ON {};",
                self.quote_ident(name),
                self.quote_qualified_name(table)
            )],

            MigrationOp::CreateView { schema, view } => vec![format!(
                "CREATE VIEW {} AS {};",
                self.quote_qualified(schema, &view.name),
                view.query.trim().trim_end_matches(';').trim_end()
            )],

            MigrationOp::DropView(name) => {
                vec![format!("DROP VIEW {};", self.quote_qualified_name(name))]
            }

            MigrationOp::AlterOwner {
                object_kind,
                name,
                args,
                owner,
            } => vec![format!(
                "ALTER {} OWNER TO {};",
                self.owner_clause(*object_kind, name, args.as_deref()),
                self.quote_ident(owner)
            )],

            MigrationOp::GrantPrivileges {
                object_kind,
                name,
                args,
                roles,
                operations,
                with_grant_option,
            } => vec![format!(
                "GRANT {} ON {} TO {}{};",
                operations.join(", "),
                self.object_clause(*object_kind, name, args.as_deref()),
                self.role_list(roles),
                if *with_grant_option {
                    " WITH GRANT OPTION"
                } else {
                    ""
                }
            )],

            MigrationOp::RevokePrivileges {
                object_kind,
                name,
                args,
                roles,
                operations,
            } => vec![format!(
                "REVOKE {} ON {} FROM {};",
                operations.join(", "),
                self.object_clause(*object_kind, name, args.as_deref()),
                self.role_list(roles)
            )],

            MigrationOp::SetComment { target, text } => {
                vec![self.generate_comment(target, text.as_deref())]
            }

            MigrationOp::InsertRow {
                table,
                columns,
                values,
            } => vec![format!(
                "INSERT INTO {} ({}) VALUES ({});",
                self.quote_qualified_name(table),
                self.column_list(columns),
                values.join(", ")
            )],

            MigrationOp::UpdateRow {
                table,
                assignments,
                key,
                previous,
            } => {
                let set = assignments
                    .iter()
                    .map(|(column, value)| format!("{} = {}", self.quote_ident(column), value))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut sql = format!(
                    "UPDATE {} SET {} WHERE {};",
                    self.quote_qualified_name(table),
                    set,
                    self.condition(key)
                );
                if !previous.is_empty() {
                    let was = previous
                        .iter()
                        .map(|(column, value)| format!("{column} = {value}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    sql.push_str(&format!(" -- was: {}", was.replace('\n', " ")));
                }
                vec![sql]
            }

            MigrationOp::DeleteRow { table, key } => vec![format!(
                "DELETE FROM {} WHERE {};",
                self.quote_qualified_name(table),
                self.condition(key)
            )],
        }
    }
}

pub fn escape_string(value: &str) -> String {
    value.replace('\'', "''")
}

fn is_numeric_literal(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok() && !trimmed.contains(['e', 'E', 'n', 'N', 'i', 'I'])
}

/// Dollar-quote a function body with a tag the body does not contain.
fn dollar_quote(body: &str) -> String {
    let mut tag = String::new();
    let mut n = 0;
    while body.contains(&format!("${tag}$")) {
        n += 1;
        tag = format!("fn{n}");
    }
    format!("${tag}${body}${tag}$")
}
